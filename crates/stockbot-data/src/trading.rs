//! 포지션·매매 이력 저장소.
//!
//! `trading_history`와 `positions`는 1:1 대응한다
//! (`positions.trading_id = trading_history.id`).
//! 개설·청산은 각각 단일 트랜잭션으로 원자 처리한다.

use sqlx::{FromRow, SqlitePool};
use tracing::info;

use stockbot_core::{ClosedTrade, CloseReason, PickType, Position};

/// 포지션 개설 입력.
#[derive(Debug, Clone)]
pub struct OpenPositionInput {
    pub ticker: String,
    pub name: String,
    /// ISO 8601 KST
    pub buy_time: String,
    pub buy_price: i64,
    pub qty: i64,
    pub trigger_source: String,
    pub mode: String,
    pub pick_type: PickType,
    pub stop_loss_price: Option<i64>,
    /// 예: "강세장 KOSPI2547"
    pub market_env: String,
    pub sector: String,
}

#[derive(Debug, Clone, FromRow)]
struct PositionRow {
    id: i64,
    trading_id: i64,
    ticker: String,
    name: Option<String>,
    buy_time: String,
    buy_price: i64,
    qty: i64,
    trigger_source: Option<String>,
    mode: Option<String>,
    pick_type: Option<String>,
    peak_price: Option<i64>,
    stop_loss_price: Option<i64>,
    market_env: Option<String>,
    sector: Option<String>,
}

impl PositionRow {
    fn into_domain(self) -> Position {
        Position {
            id: self.id,
            trading_id: self.trading_id,
            ticker: self.ticker,
            name: self.name.unwrap_or_default(),
            buy_time: self.buy_time,
            buy_price: self.buy_price,
            qty: self.qty,
            trigger_source: self.trigger_source.unwrap_or_default(),
            mode: self.mode.unwrap_or_else(|| "VTS".to_string()),
            pick_type: PickType::parse(self.pick_type.as_deref().unwrap_or("swing")),
            peak_price: self.peak_price,
            stop_loss_price: self.stop_loss_price,
            market_env: self.market_env.unwrap_or_default(),
            sector: self.sector.unwrap_or_default(),
        }
    }
}

const SELECT_POSITION: &str = r#"
    SELECT id, trading_id, ticker, name, buy_time, buy_price, qty,
           trigger_source, mode, pick_type, peak_price, stop_loss_price,
           market_env, sector
    FROM positions
"#;

pub struct TradingRepository;

impl TradingRepository {
    /// 포지션 개설 — trading_history(sell_time NULL) + positions 원자 삽입.
    ///
    /// 반환: (positions.id, trading_history.id)
    pub async fn open_position(
        pool: &SqlitePool,
        input: &OpenPositionInput,
    ) -> Result<(i64, i64), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let trading_id = sqlx::query(
            r#"
            INSERT INTO trading_history
                (ticker, name, buy_time, buy_price, qty, trigger_source, mode,
                 pick_type, buy_market_context, sector)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.ticker)
        .bind(&input.name)
        .bind(&input.buy_time)
        .bind(input.buy_price)
        .bind(input.qty)
        .bind(&input.trigger_source)
        .bind(&input.mode)
        .bind(input.pick_type.as_str())
        .bind(&input.market_env)
        .bind(&input.sector)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let position_id = sqlx::query(
            r#"
            INSERT INTO positions
                (trading_id, ticker, name, buy_time, buy_price, qty,
                 trigger_source, mode, pick_type, stop_loss_price, market_env, sector)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(trading_id)
        .bind(&input.ticker)
        .bind(&input.name)
        .bind(&input.buy_time)
        .bind(input.buy_price)
        .bind(input.qty)
        .bind(&input.trigger_source)
        .bind(&input.mode)
        .bind(input.pick_type.as_str())
        .bind(input.stop_loss_price)
        .bind(&input.market_env)
        .bind(&input.sector)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        info!(
            ticker = %input.ticker,
            qty = input.qty,
            buy_price = input.buy_price,
            trigger = %input.trigger_source,
            position_id,
            "포지션 개설"
        );
        Ok((position_id, trading_id))
    }

    /// 모드별 오픈 포지션 전체 (매수 시각 순).
    pub async fn open_positions(
        pool: &SqlitePool,
        mode: &str,
    ) -> Result<Vec<Position>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PositionRow>(
            &format!("{} WHERE mode = ? ORDER BY buy_time", SELECT_POSITION),
        )
        .bind(mode)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(PositionRow::into_domain).collect())
    }

    /// 해당 종목 보유 여부 (모드 스코프).
    pub async fn is_held(
        pool: &SqlitePool,
        mode: &str,
        ticker: &str,
    ) -> Result<bool, sqlx::Error> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM positions WHERE mode = ? AND ticker = ?")
                .bind(mode)
                .bind(ticker)
                .fetch_one(pool)
                .await?;
        Ok(row.0 > 0)
    }

    /// 모드별 오픈 포지션 수.
    pub async fn count_open(pool: &SqlitePool, mode: &str) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM positions WHERE mode = ?")
            .bind(mode)
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }

    /// 당일 실현 손익 합계 (원). `iso_date`는 YYYY-MM-DD.
    pub async fn today_realized_amount(
        pool: &SqlitePool,
        mode: &str,
        iso_date: &str,
    ) -> Result<i64, sqlx::Error> {
        let row: (Option<i64>,) = sqlx::query_as(
            r#"
            SELECT SUM(profit_amount) FROM trading_history
            WHERE substr(buy_time, 1, 10) = ? AND mode = ? AND sell_time IS NOT NULL
            "#,
        )
        .bind(iso_date)
        .bind(mode)
        .fetch_one(pool)
        .await?;
        Ok(row.0.unwrap_or(0))
    }

    /// 보유 중 최고가 갱신 (check_exit 전용).
    pub async fn update_peak(
        pool: &SqlitePool,
        position_id: i64,
        peak_price: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE positions SET peak_price = ? WHERE id = ?")
            .bind(peak_price)
            .bind(position_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// 포지션 청산 — trading_history 갱신 + positions 삭제 원자 처리.
    pub async fn close_position(
        pool: &SqlitePool,
        position: &Position,
        sell_time: &str,
        sell_price: i64,
        reason: CloseReason,
    ) -> Result<ClosedTrade, sqlx::Error> {
        let (profit_rate, profit_amount) =
            ClosedTrade::pnl(position.buy_price, sell_price, position.qty);

        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE trading_history
            SET sell_time = ?, sell_price = ?, profit_rate = ?,
                profit_amount = ?, close_reason = ?
            WHERE id = ?
            "#,
        )
        .bind(sell_time)
        .bind(sell_price)
        .bind(profit_rate)
        .bind(profit_amount)
        .bind(reason.as_str())
        .bind(position.trading_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM positions WHERE id = ?")
            .bind(position.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            ticker = %position.ticker,
            reason = %reason,
            buy_price = position.buy_price,
            sell_price,
            profit_rate,
            "포지션 청산"
        );

        Ok(ClosedTrade {
            trading_id: position.trading_id,
            ticker: position.ticker.clone(),
            name: position.name.clone(),
            buy_time: position.buy_time.clone(),
            sell_time: sell_time.to_string(),
            buy_price: position.buy_price,
            sell_price,
            qty: position.qty,
            profit_rate,
            profit_amount,
            trigger_source: position.trigger_source.clone(),
            close_reason: reason,
            mode: position.mode.clone(),
            market_env: position.market_env.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_util::test_pool;

    fn input(ticker: &str, pick_type: PickType) -> OpenPositionInput {
        OpenPositionInput {
            ticker: ticker.to_string(),
            name: "테스트종목".to_string(),
            buy_time: "2026-08-03T09:30:00+09:00".to_string(),
            buy_price: 10_000,
            qty: 10,
            trigger_source: "watchlist".to_string(),
            mode: "VTS".to_string(),
            pick_type,
            stop_loss_price: None,
            market_env: "강세장 KOSPI2550".to_string(),
            sector: "반도체".to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_and_query() {
        let (_dir, pool) = test_pool().await;
        let (pos_id, trading_id) =
            TradingRepository::open_position(&pool, &input("005930", PickType::DayTrade))
                .await
                .unwrap();
        assert!(pos_id > 0 && trading_id > 0);

        assert!(TradingRepository::is_held(&pool, "VTS", "005930").await.unwrap());
        assert!(!TradingRepository::is_held(&pool, "REAL", "005930").await.unwrap());
        assert_eq!(TradingRepository::count_open(&pool, "VTS").await.unwrap(), 1);

        let positions = TradingRepository::open_positions(&pool, "VTS").await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].pick_type, PickType::DayTrade);
        assert_eq!(positions[0].market_env, "강세장 KOSPI2550");
    }

    #[tokio::test]
    async fn test_close_removes_position_and_settles_history() {
        let (_dir, pool) = test_pool().await;
        TradingRepository::open_position(&pool, &input("005930", PickType::Swing))
            .await
            .unwrap();
        let position = TradingRepository::open_positions(&pool, "VTS")
            .await
            .unwrap()
            .remove(0);

        let closed = TradingRepository::close_position(
            &pool,
            &position,
            "2026-08-03T14:50:00+09:00",
            10_500,
            CloseReason::ForceClose,
        )
        .await
        .unwrap();

        assert_eq!(closed.profit_rate, 5.0);
        assert_eq!(closed.profit_amount, 5_000);
        assert_eq!(TradingRepository::count_open(&pool, "VTS").await.unwrap(), 0);

        // 미청산 행 불변식: sell_time이 채워졌다
        let (sell_time,): (Option<String>,) =
            sqlx::query_as("SELECT sell_time FROM trading_history WHERE id = ?")
                .bind(position.trading_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(sell_time.is_some());
    }

    #[tokio::test]
    async fn test_today_realized_amount() {
        let (_dir, pool) = test_pool().await;
        TradingRepository::open_position(&pool, &input("005930", PickType::Swing))
            .await
            .unwrap();
        let position = TradingRepository::open_positions(&pool, "VTS")
            .await
            .unwrap()
            .remove(0);
        TradingRepository::close_position(
            &pool,
            &position,
            "2026-08-03T10:00:00+09:00",
            9_700,
            CloseReason::StopLoss,
        )
        .await
        .unwrap();

        let pnl = TradingRepository::today_realized_amount(&pool, "VTS", "2026-08-03")
            .await
            .unwrap();
        assert_eq!(pnl, -3_000);

        // 다른 날짜는 0
        let pnl = TradingRepository::today_realized_amount(&pool, "VTS", "2026-08-04")
            .await
            .unwrap();
        assert_eq!(pnl, 0);
    }
}
