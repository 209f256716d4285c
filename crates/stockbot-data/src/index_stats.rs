//! KOSPI 레벨별 승률 통계 저장소.

use sqlx::{FromRow, SqlitePool};

/// kospi_index_stats 1행.
#[derive(Debug, Clone, FromRow)]
pub struct IndexStatsRow {
    pub kospi_range: String,
    pub kospi_level: i64,
    pub win_count: i64,
    pub total_count: i64,
    pub win_rate: f64,
    pub avg_profit_rate: f64,
}

/// 집계 입력: 청산 거래의 (수익률, 매수 컨텍스트).
#[derive(Debug, Clone, FromRow)]
pub struct TradeContextRow {
    pub profit_rate: Option<f64>,
    pub buy_market_context: Option<String>,
}

pub struct IndexStatsRepository;

impl IndexStatsRepository {
    /// 청산 완료 + 매수 컨텍스트가 있는 거래 전체.
    pub async fn closed_trades_with_context(
        pool: &SqlitePool,
    ) -> Result<Vec<TradeContextRow>, sqlx::Error> {
        sqlx::query_as::<_, TradeContextRow>(
            r#"
            SELECT profit_rate, buy_market_context
            FROM trading_history
            WHERE sell_time IS NOT NULL
              AND buy_market_context IS NOT NULL
              AND buy_market_context != ''
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// 구간 통계 UPSERT (kospi_range 키).
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_bucket(
        pool: &SqlitePool,
        trade_date: &str,
        kospi_level: i64,
        kospi_range: &str,
        win_count: i64,
        total_count: i64,
        win_rate: f64,
        avg_profit_rate: f64,
        now_iso: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO kospi_index_stats
                (trade_date, kospi_level, kospi_range,
                 win_count, total_count, win_rate, avg_profit_rate, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kospi_range) DO UPDATE SET
                trade_date      = excluded.trade_date,
                win_count       = excluded.win_count,
                total_count     = excluded.total_count,
                win_rate        = excluded.win_rate,
                avg_profit_rate = excluded.avg_profit_rate,
                last_updated    = excluded.last_updated
            "#,
        )
        .bind(trade_date)
        .bind(kospi_level)
        .bind(kospi_range)
        .bind(win_count)
        .bind(total_count)
        .bind(win_rate)
        .bind(avg_profit_rate)
        .bind(now_iso)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// 거래 수 많은 순 상위 구간 (최소 표본 3건).
    pub async fn top_buckets(
        pool: &SqlitePool,
        limit: i64,
    ) -> Result<Vec<IndexStatsRow>, sqlx::Error> {
        sqlx::query_as::<_, IndexStatsRow>(
            r#"
            SELECT kospi_range, kospi_level, win_count, total_count, win_rate, avg_profit_rate
            FROM kospi_index_stats
            WHERE total_count >= 3
            ORDER BY total_count DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
