//! 수익률 추적 배치 (15:45).
//!
//! 호라이즌 h ∈ {1, 3, 7} (캘린더일)마다:
//! ① `alert_date = 오늘 − h` 인 미추적 행 조회
//! ② 당일 마감 확정 종가 일괄 조회 (시장당 1회)
//! ③ 수익률 계산 → 단일 트랜잭션으로 일괄 UPDATE
//!
//! 종가가 없거나(상장폐지·정지) 알림 시점 가격이 없으면 수익률 없이
//! done만 표시한다. done=1 행은 다시 선택되지 않는다 — 같은 날 재실행은
//! 0건 업데이트다.
//!
//! 세 호라이즌 정산 후 RAG 패턴 저장을 호출한다.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use sqlx::SqlitePool;
use tracing::{info, warn};

use stockbot_core::{today_kst, BotResult};
use stockbot_data::alerts::AlertRepository;
use stockbot_data::performance::{
    Horizon, PerformanceRepository, Settlement, TriggerStats, WeeklyPickRow,
};
use stockbot_data::picks::PickRepository;

use crate::rag::{DayOutcome, RagStore};

/// 마감 확정 종가 소스.
///
/// 해당 날짜 전 종목 종가를 {종목코드: 종가} 로 반환한다.
/// 구현체는 시장(코스피/코스닥)당 1회 호출로 일괄 조회한다.
#[async_trait]
pub trait ClosePriceSource: Send + Sync {
    async fn closing_prices(&self, date_ymd: &str) -> BotResult<HashMap<String, i64>>;
}

/// 배치 결과.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub updated: usize,
    pub stats: Vec<TriggerStats>,
}

/// 주간 성과 통계.
#[derive(Debug, Clone, Default)]
pub struct WeeklyStats {
    /// "YYYY.MM.DD ~ YYYY.MM.DD"
    pub period: String,
    pub total_alerts: i64,
    pub trigger_stats: Vec<TriggerStats>,
    pub top_picks: Vec<WeeklyPickRow>,
    pub miss_picks: Vec<WeeklyPickRow>,
}

/// 수익률 추적기.
pub struct PerformanceTracker {
    pool: SqlitePool,
    prices: Arc<dyn ClosePriceSource>,
}

impl PerformanceTracker {
    pub fn new(pool: SqlitePool, prices: Arc<dyn ClosePriceSource>) -> Self {
        Self { pool, prices }
    }

    /// 배치 실행. `outcomes`는 당일 실현 결과 (RAG 저장용, 없으면 빈 슬라이스).
    pub async fn run_batch(&self, outcomes: &[DayOutcome]) -> BatchResult {
        let today = today_kst();
        let today_str = today.format("%Y%m%d").to_string();
        info!("수익률 추적 배치 시작 — 기준일: {}", today_str);

        // 당일 종가 일괄 조회 — 세 호라이즌이 공유
        let price_map = match self.prices.closing_prices(&today_str).await {
            Ok(map) => map,
            Err(e) => {
                warn!("종가 일괄 조회 실패: {} — 빈 맵으로 진행 (done 표시만)", e);
                HashMap::new()
            }
        };

        let mut total_updated = 0;
        for horizon in Horizon::ALL {
            let target_date = (today - Duration::days(horizon.days()))
                .format("%Y%m%d")
                .to_string();
            let count = self
                .settle_horizon(horizon, &target_date, &today_str, &price_map)
                .await;
            info!("{}일 추적 업데이트: {}건", horizon.days(), count);
            total_updated += count;
        }

        let stats = PerformanceRepository::trigger_stats(&self.pool)
            .await
            .unwrap_or_default();
        if !stats.is_empty() {
            info!("=== 트리거별 7일 승률 ===");
            for row in &stats {
                info!(
                    "  [{}] 승률 {}% (n={}) 평균수익 {}%",
                    row.trigger_type.as_deref().unwrap_or("unknown"),
                    row.win_rate_7d.unwrap_or(0.0),
                    row.tracked_7d.unwrap_or(0),
                    row.avg_return_7d.unwrap_or(0.0),
                );
            }
        }

        // RAG 패턴 누적 — 당일 픽 + 실현 결과
        match PickRepository::load_for_date(&self.pool, &today_str).await {
            Ok(picks) => {
                if let Err(e) = RagStore::save(&self.pool, &today_str, &picks, outcomes).await {
                    warn!("RAG 패턴 저장 실패 (비치명적): {}", e);
                }
            }
            Err(e) => warn!("daily_picks 조회 실패 (RAG 저장 건너뜀): {}", e),
        }

        info!("배치 완료 — 총 {}건 업데이트", total_updated);
        BatchResult {
            updated: total_updated,
            stats,
        }
    }

    async fn settle_horizon(
        &self,
        horizon: Horizon,
        target_date: &str,
        today_str: &str,
        price_map: &HashMap<String, i64>,
    ) -> usize {
        let pending =
            match PerformanceRepository::pending_rows(&self.pool, horizon, target_date).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("{}일 미추적 행 조회 실패: {}", horizon.days(), e);
                    return 0;
                }
            };
        if pending.is_empty() {
            return 0;
        }

        let mut settlements = Vec::with_capacity(pending.len());
        for row in &pending {
            let current = price_map.get(&row.ticker).copied();
            let base = row.price_at_alert.unwrap_or(0);

            match current {
                Some(price) if price > 0 && base > 0 => {
                    let ret = (price - base) as f64 / base as f64 * 100.0;
                    settlements.push(Settlement::Priced {
                        row_id: row.id,
                        price,
                        return_pct: (ret * 100.0).round() / 100.0,
                    });
                }
                // 가격 없음(상폐·정지) 또는 알림 시 가격 미기록 → done만 표시
                _ => settlements.push(Settlement::DoneOnly { row_id: row.id }),
            }
        }

        match PerformanceRepository::settle(&self.pool, horizon, today_str, &settlements).await {
            Ok(n) => n,
            Err(e) => {
                warn!("{}일 정산 실패: {}", horizon.days(), e);
                0
            }
        }
    }

    /// 지난 7일 성과 통계 (주간 리포트용).
    pub async fn get_weekly_stats(&self) -> WeeklyStats {
        let today = today_kst();
        let from_date = (today - Duration::days(7)).format("%Y%m%d").to_string();
        let to_date = today.format("%Y%m%d").to_string();

        let fmt = |d: &str| format!("{}.{}.{}", &d[..4], &d[4..6], &d[6..]);

        WeeklyStats {
            period: format!("{} ~ {}", fmt(&from_date), fmt(&to_date)),
            total_alerts: AlertRepository::count_between(&self.pool, &from_date, &to_date)
                .await
                .unwrap_or(0),
            trigger_stats: PerformanceRepository::trigger_stats(&self.pool)
                .await
                .unwrap_or_default(),
            top_picks: PerformanceRepository::weekly_picks(&self.pool, &from_date, &to_date, true, 5)
                .await
                .unwrap_or_default(),
            miss_picks: PerformanceRepository::weekly_picks(
                &self.pool, &from_date, &to_date, false, 5,
            )
            .await
            .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbot_data::store;

    struct FixedPrices(HashMap<String, i64>);

    #[async_trait]
    impl ClosePriceSource for FixedPrices {
        async fn closing_prices(&self, _date_ymd: &str) -> BotResult<HashMap<String, i64>> {
            Ok(self.0.clone())
        }
    }

    async fn setup() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = store::open_pool(path.to_str().unwrap()).await.unwrap();
        store::init_db(&pool).await.unwrap();
        (dir, pool)
    }

    async fn seed_alert(pool: &SqlitePool, ticker: &str, alert_date: &str, price: i64) {
        let alert_id = sqlx::query(
            "INSERT INTO alert_history (ticker, name, alert_time, alert_date, source, price_at_alert) \
             VALUES (?, ?, ?, ?, 'volume', ?)",
        )
        .bind(ticker)
        .bind(ticker)
        .bind(format!("{}T10:00:00+09:00", alert_date))
        .bind(alert_date)
        .bind(price)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();

        sqlx::query(
            "INSERT INTO performance_tracker (alert_id, ticker, alert_date, price_at_alert) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(alert_id)
        .bind(ticker)
        .bind(alert_date)
        .bind(price)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_batch_settles_each_horizon_once() {
        let (_dir, pool) = setup().await;
        let today = today_kst();
        let d1 = (today - Duration::days(1)).format("%Y%m%d").to_string();
        let d7 = (today - Duration::days(7)).format("%Y%m%d").to_string();

        seed_alert(&pool, "000001", &d1, 10_000).await;
        seed_alert(&pool, "000002", &d7, 20_000).await;

        let mut prices = HashMap::new();
        prices.insert("000001".to_string(), 11_000i64);
        prices.insert("000002".to_string(), 19_000i64);
        let tracker = PerformanceTracker::new(pool.clone(), Arc::new(FixedPrices(prices)));

        let result = tracker.run_batch(&[]).await;
        assert_eq!(result.updated, 2);

        let (ret_1d,): (Option<f64>,) = sqlx::query_as(
            "SELECT return_1d FROM performance_tracker WHERE ticker = '000001'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(ret_1d, Some(10.0));

        let (ret_7d,): (Option<f64>,) = sqlx::query_as(
            "SELECT return_7d FROM performance_tracker WHERE ticker = '000002'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(ret_7d, Some(-5.0));

        // 재실행은 0건 (done 단조성)
        let result = tracker.run_batch(&[]).await;
        assert_eq!(result.updated, 0);
    }

    #[tokio::test]
    async fn test_missing_price_marks_done_without_return() {
        let (_dir, pool) = setup().await;
        let d1 = (today_kst() - Duration::days(1)).format("%Y%m%d").to_string();
        seed_alert(&pool, "DELISTED", &d1, 10_000).await;

        let tracker =
            PerformanceTracker::new(pool.clone(), Arc::new(FixedPrices(HashMap::new())));
        let result = tracker.run_batch(&[]).await;
        assert_eq!(result.updated, 1);

        let (done, ret): (i64, Option<f64>) = sqlx::query_as(
            "SELECT done_1d, return_1d FROM performance_tracker WHERE ticker = 'DELISTED'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(done, 1);
        assert!(ret.is_none());
    }

    #[tokio::test]
    async fn test_weekly_stats_shape() {
        let (_dir, pool) = setup().await;
        let tracker =
            PerformanceTracker::new(pool.clone(), Arc::new(FixedPrices(HashMap::new())));
        let stats = tracker.get_weekly_stats().await;
        assert!(stats.period.contains('~'));
        assert_eq!(stats.total_alerts, 0);
    }
}
