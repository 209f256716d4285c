//! 테마 이벤트 이력 저장소 (insert-only).

use sqlx::SqlitePool;
use tracing::info;

/// theme_event_history 삽입 1행.
#[derive(Debug, Clone)]
pub struct NewThemeEvent {
    /// YYYY-MM-DD
    pub date: String,
    pub event_type: Option<String>,
    pub event_summary: Option<String>,
    pub signal_type: Option<String>,
    pub triggered_sector: String,
    pub top_ticker: Option<String>,
    pub top_name: Option<String>,
    pub top_change_pct: Option<f64>,
    pub sector_avg_pct: Option<f64>,
}

pub struct ThemeHistoryRepository;

impl ThemeHistoryRepository {
    /// 이력 벌크 삽입 (단일 트랜잭션). 삽입 건수 반환.
    pub async fn insert_events(
        pool: &SqlitePool,
        rows: &[NewThemeEvent],
    ) -> Result<usize, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO theme_event_history
                    (date, event_type, event_summary, signal_type,
                     triggered_sector, top_ticker, top_name,
                     top_change_pct, sector_avg_pct)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.date)
            .bind(&row.event_type)
            .bind(&row.event_summary)
            .bind(&row.signal_type)
            .bind(&row.triggered_sector)
            .bind(&row.top_ticker)
            .bind(&row.top_name)
            .bind(row.top_change_pct)
            .bind(row.sector_avg_pct)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(count = rows.len(), "테마 이벤트 이력 기록");
        Ok(rows.len())
    }
}
