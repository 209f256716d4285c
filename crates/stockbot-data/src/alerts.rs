//! 장중 알림 기록.
//!
//! 알림 1건을 `alert_history`에 넣고, 같은 트랜잭션에서
//! `performance_tracker`에 미추적(done_*=0) 행을 예약한다.

use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use stockbot_core::{now_kst, IntradayAlert};

/// alert_history 1행.
#[derive(Debug, Clone, FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub ticker: String,
    pub name: Option<String>,
    pub alert_time: String,
    pub alert_date: String,
    pub change_rate: Option<f64>,
    pub delta_rate: Option<f64>,
    pub source: Option<String>,
    pub price_at_alert: Option<i64>,
}

pub struct AlertRepository;

impl AlertRepository {
    /// 알림 기록 + 수익률 추적 행 예약 (단일 트랜잭션).
    ///
    /// 반환: alert_history.id
    pub async fn record_alert(
        pool: &SqlitePool,
        alert: &IntradayAlert,
    ) -> Result<i64, sqlx::Error> {
        let now = now_kst();
        let alert_time = now.to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
        let alert_date = now.format("%Y%m%d").to_string();

        let mut tx = pool.begin().await?;

        let alert_id = sqlx::query(
            r#"
            INSERT INTO alert_history
                (ticker, name, alert_time, alert_date,
                 change_rate, delta_rate, source, price_at_alert)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert.stock_code)
        .bind(&alert.stock_name)
        .bind(&alert_time)
        .bind(&alert_date)
        .bind(alert.change_rate)
        .bind(alert.delta_rate)
        .bind(alert.source.as_str())
        .bind(alert.current_price)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            r#"
            INSERT INTO performance_tracker
                (alert_id, ticker, alert_date, price_at_alert)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(alert_id)
        .bind(&alert.stock_code)
        .bind(&alert_date)
        .bind(alert.current_price)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            ticker = %alert.stock_code,
            change = alert.change_rate,
            source = %alert.source,
            alert_id,
            "알림 기록 완료"
        );
        Ok(alert_id)
    }

    /// 기간 내 알림 건수 (주간 리포트용).
    pub async fn count_between(
        pool: &SqlitePool,
        from_date: &str,
        to_date: &str,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM alert_history WHERE alert_date BETWEEN ? AND ?",
        )
        .bind(from_date)
        .bind(to_date)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_util::test_pool;
    use stockbot_core::{AlertSource, AlertType};

    fn sample_alert() -> IntradayAlert {
        IntradayAlert {
            stock_code: "005930".to_string(),
            stock_name: "삼성전자".to_string(),
            current_price: 70_000,
            change_rate: 4.7,
            delta_rate: 1.2,
            volume_ratio: 2.5,
            momentary_strength: 45.0,
            condition_met: true,
            detected_at: "10:15:30".to_string(),
            source: AlertSource::Watchlist,
            orderbook_analysis: None,
            pick_reason: "수주 공시".to_string(),
            alert_type: AlertType::PriceTarget,
        }
    }

    #[tokio::test]
    async fn test_record_creates_both_rows() {
        let (_dir, pool) = test_pool().await;
        let alert_id = AlertRepository::record_alert(&pool, &sample_alert())
            .await
            .unwrap();
        assert!(alert_id > 0);

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM performance_tracker \
             WHERE alert_id = ? AND done_1d = 0 AND done_3d = 0 AND done_7d = 0",
        )
        .bind(alert_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }
}
