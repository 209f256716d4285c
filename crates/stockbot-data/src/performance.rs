//! 수익률 추적 행 저장소.
//!
//! 호라이즌(1/3/7일)별 미추적 행 조회와 일괄 정산을 담당한다.
//! 정산은 호라이즌당 단일 트랜잭션 — 행 단위 커밋 금지.

use sqlx::{FromRow, SqlitePool};

/// 추적 호라이즌 (캘린더일).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    D1,
    D3,
    D7,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::D1, Horizon::D3, Horizon::D7];

    /// 캘린더일 오프셋.
    pub fn days(&self) -> i64 {
        match self {
            Horizon::D1 => 1,
            Horizon::D3 => 3,
            Horizon::D7 => 7,
        }
    }

    fn select_pending_sql(&self) -> &'static str {
        match self {
            Horizon::D1 => {
                "SELECT id, ticker, price_at_alert FROM performance_tracker \
                 WHERE done_1d = 0 AND alert_date = ?"
            }
            Horizon::D3 => {
                "SELECT id, ticker, price_at_alert FROM performance_tracker \
                 WHERE done_3d = 0 AND alert_date = ?"
            }
            Horizon::D7 => {
                "SELECT id, ticker, price_at_alert FROM performance_tracker \
                 WHERE done_7d = 0 AND alert_date = ?"
            }
        }
    }

    fn settle_sql(&self) -> &'static str {
        match self {
            Horizon::D1 => {
                "UPDATE performance_tracker \
                 SET price_1d = ?, return_1d = ?, done_1d = 1, tracked_date_1d = ? WHERE id = ?"
            }
            Horizon::D3 => {
                "UPDATE performance_tracker \
                 SET price_3d = ?, return_3d = ?, done_3d = 1, tracked_date_3d = ? WHERE id = ?"
            }
            Horizon::D7 => {
                "UPDATE performance_tracker \
                 SET price_7d = ?, return_7d = ?, done_7d = 1, tracked_date_7d = ? WHERE id = ?"
            }
        }
    }

    fn done_only_sql(&self) -> &'static str {
        match self {
            Horizon::D1 => {
                "UPDATE performance_tracker SET done_1d = 1, tracked_date_1d = ? WHERE id = ?"
            }
            Horizon::D3 => {
                "UPDATE performance_tracker SET done_3d = 1, tracked_date_3d = ? WHERE id = ?"
            }
            Horizon::D7 => {
                "UPDATE performance_tracker SET done_7d = 1, tracked_date_7d = ? WHERE id = ?"
            }
        }
    }
}

/// 미추적 행.
#[derive(Debug, Clone, FromRow)]
pub struct PendingRow {
    pub id: i64,
    pub ticker: String,
    pub price_at_alert: Option<i64>,
}

/// 한 행의 정산 결과.
#[derive(Debug, Clone)]
pub enum Settlement {
    /// 종가·수익률 기록
    Priced {
        row_id: i64,
        price: i64,
        return_pct: f64,
    },
    /// 가격 조회 불가 — done 플래그만
    DoneOnly { row_id: i64 },
}

/// 트리거별 승률 통계 (trigger_stats 뷰 1행).
#[derive(Debug, Clone, FromRow)]
pub struct TriggerStats {
    pub trigger_type: Option<String>,
    pub total_alerts: i64,
    pub tracked_7d: Option<i64>,
    pub win_7d: Option<i64>,
    pub win_rate_7d: Option<f64>,
    pub avg_return_7d: Option<f64>,
}

/// 주간 리포트용 종목 성과.
#[derive(Debug, Clone, FromRow)]
pub struct WeeklyPickRow {
    pub name: Option<String>,
    pub ticker: String,
    pub source: Option<String>,
    pub change_rate: Option<f64>,
    pub return_7d: Option<f64>,
    pub price_at_alert: Option<i64>,
    pub price_7d: Option<i64>,
}

pub struct PerformanceRepository;

impl PerformanceRepository {
    /// 해당 호라이즌의 미추적 행 (alert_date = target_date, done = 0).
    pub async fn pending_rows(
        pool: &SqlitePool,
        horizon: Horizon,
        target_date: &str,
    ) -> Result<Vec<PendingRow>, sqlx::Error> {
        sqlx::query_as::<_, PendingRow>(horizon.select_pending_sql())
            .bind(target_date)
            .fetch_all(pool)
            .await
    }

    /// 정산 일괄 적용 — 단일 트랜잭션, 적용 건수 반환.
    pub async fn settle(
        pool: &SqlitePool,
        horizon: Horizon,
        tracked_date: &str,
        settlements: &[Settlement],
    ) -> Result<usize, sqlx::Error> {
        if settlements.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;
        for s in settlements {
            match s {
                Settlement::Priced {
                    row_id,
                    price,
                    return_pct,
                } => {
                    sqlx::query(horizon.settle_sql())
                        .bind(price)
                        .bind(return_pct)
                        .bind(tracked_date)
                        .bind(row_id)
                        .execute(&mut *tx)
                        .await?;
                }
                Settlement::DoneOnly { row_id } => {
                    sqlx::query(horizon.done_only_sql())
                        .bind(tracked_date)
                        .bind(row_id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(settlements.len())
    }

    /// trigger_stats 뷰 조회 (승률 내림차순).
    pub async fn trigger_stats(pool: &SqlitePool) -> Result<Vec<TriggerStats>, sqlx::Error> {
        sqlx::query_as::<_, TriggerStats>(
            r#"
            SELECT trigger_type, total_alerts, tracked_7d, win_7d, win_rate_7d, avg_return_7d
            FROM trigger_stats
            ORDER BY win_rate_7d DESC
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// 기간 내 7일 수익률 상위/하위 종목 (주간 리포트용).
    pub async fn weekly_picks(
        pool: &SqlitePool,
        from_date: &str,
        to_date: &str,
        best: bool,
        limit: i64,
    ) -> Result<Vec<WeeklyPickRow>, sqlx::Error> {
        let order = if best { "DESC" } else { "ASC" };
        let sql = format!(
            r#"
            SELECT ah.name, ah.ticker, ah.source, ah.change_rate,
                   pt.return_7d, pt.price_at_alert, pt.price_7d
            FROM performance_tracker pt
            JOIN alert_history ah ON pt.alert_id = ah.id
            WHERE pt.done_7d = 1 AND pt.return_7d IS NOT NULL
              AND ah.alert_date BETWEEN ? AND ?
            ORDER BY pt.return_7d {}
            LIMIT ?
            "#,
            order
        );
        sqlx::query_as::<_, WeeklyPickRow>(&sql)
            .bind(from_date)
            .bind(to_date)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
