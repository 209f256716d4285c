//! 이벤트→급등 섹터 이력 기록.
//!
//! 저장만 한다 — 분석·발송·AI 호출 없음. 마감 후 급등 종목을 섹터별로
//! 묶어 대장주·섹터 평균 등락률과 함께 누적한다.

use std::collections::HashMap;

use sqlx::SqlitePool;
use tracing::info;

use stockbot_data::theme_history::{NewThemeEvent, ThemeHistoryRepository};

/// 마감 급등 종목 1건 (섹터 이력 입력).
#[derive(Debug, Clone)]
pub struct ClosingGainer {
    pub ticker: String,
    pub name: String,
    pub change_pct: f64,
    pub sector: String,
}

/// 테마 이력 기록기.
pub struct ThemeHistoryRecorder {
    pool: SqlitePool,
    enabled: bool,
}

impl ThemeHistoryRecorder {
    pub fn new(pool: SqlitePool, enabled: bool) -> Self {
        Self { pool, enabled }
    }

    /// 마감 후 섹터별 급등 이력 기록. 기록된 행 수 반환.
    ///
    /// `date_str`은 YYYYMMDD 또는 YYYY-MM-DD 모두 허용한다.
    pub async fn record_closing(&self, date_str: &str, gainers: &[ClosingGainer]) -> usize {
        if !self.enabled {
            info!("THEME_HISTORY_ENABLED=false — 기록 건너뜀");
            return 0;
        }

        let date = normalize_date(date_str);
        let rows = build_rows(&date, gainers);
        if rows.is_empty() {
            info!("기록할 테마 이력 없음");
            return 0;
        }

        ThemeHistoryRepository::insert_events(&self.pool, &rows)
            .await
            .unwrap_or(0)
    }
}

/// YYYYMMDD → YYYY-MM-DD 정규화.
fn normalize_date(date_str: &str) -> String {
    if date_str.len() == 8 && !date_str.contains('-') {
        format!("{}-{}-{}", &date_str[..4], &date_str[4..6], &date_str[6..8])
    } else {
        date_str.to_string()
    }
}

/// 급등 종목을 섹터별로 묶어 이력 행 생성.
///
/// 섹터마다 대장주(최고 등락률)와 섹터 평균 등락률을 계산한다.
/// 섹터 미상 종목은 제외한다.
fn build_rows(date: &str, gainers: &[ClosingGainer]) -> Vec<NewThemeEvent> {
    let mut by_sector: HashMap<&str, Vec<&ClosingGainer>> = HashMap::new();
    for gainer in gainers {
        if gainer.sector.is_empty() {
            continue;
        }
        by_sector.entry(gainer.sector.as_str()).or_default().push(gainer);
    }

    let mut rows = Vec::new();
    for (sector, members) in by_sector {
        let top = members
            .iter()
            .max_by(|a, b| {
                a.change_pct
                    .partial_cmp(&b.change_pct)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("섹터 그룹은 비어있지 않다");
        let avg: f64 = members.iter().map(|g| g.change_pct).sum::<f64>() / members.len() as f64;

        rows.push(NewThemeEvent {
            date: date.to_string(),
            event_type: None,
            event_summary: None,
            signal_type: None,
            triggered_sector: sector.to_string(),
            top_ticker: Some(top.ticker.clone()),
            top_name: Some(top.name.clone()),
            top_change_pct: Some(top.change_pct),
            sector_avg_pct: Some((avg * 10.0).round() / 10.0),
        });
    }

    rows.sort_by(|a, b| {
        b.top_change_pct
            .partial_cmp(&a.top_change_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbot_data::store;

    fn gainer(ticker: &str, change: f64, sector: &str) -> ClosingGainer {
        ClosingGainer {
            ticker: ticker.to_string(),
            name: format!("종목{}", ticker),
            change_pct: change,
            sector: sector.to_string(),
        }
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("20260803"), "2026-08-03");
        assert_eq!(normalize_date("2026-08-03"), "2026-08-03");
    }

    #[test]
    fn test_build_rows_sector_grouping() {
        let rows = build_rows(
            "2026-08-03",
            &[
                gainer("000001", 29.9, "반도체"),
                gainer("000002", 15.0, "반도체"),
                gainer("000003", 22.0, "2차전지"),
                gainer("000004", 18.0, ""), // 섹터 미상 → 제외
            ],
        );
        assert_eq!(rows.len(), 2);
        // 대장주 등락률 내림차순
        assert_eq!(rows[0].triggered_sector, "반도체");
        assert_eq!(rows[0].top_ticker.as_deref(), Some("000001"));
        assert_eq!(rows[0].sector_avg_pct, Some(22.5));
        assert_eq!(rows[1].triggered_sector, "2차전지");
    }

    #[tokio::test]
    async fn test_record_closing_gated_by_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = store::open_pool(path.to_str().unwrap()).await.unwrap();
        store::init_db(&pool).await.unwrap();

        let disabled = ThemeHistoryRecorder::new(pool.clone(), false);
        assert_eq!(
            disabled.record_closing("20260803", &[gainer("000001", 29.9, "반도체")]).await,
            0
        );

        let enabled = ThemeHistoryRecorder::new(pool.clone(), true);
        assert_eq!(
            enabled.record_closing("20260803", &[gainer("000001", 29.9, "반도체")]).await,
            1
        );

        let (date,): (String,) =
            sqlx::query_as("SELECT date FROM theme_event_history LIMIT 1")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(date, "2026-08-03");
    }
}
