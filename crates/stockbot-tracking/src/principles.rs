//! 매매 원칙 주간 추출 배치 (일요일 03:00).
//!
//! ① trading_history를 trigger_source별로 집계 (청산 완료 거래만)
//! ② 승률 = (take_profit_1 + take_profit_2) / 전체
//! ③ 기존 원칙은 UPDATE, 신규는 샘플 MIN_SAMPLE건 이상일 때만 INSERT
//! ④ 30일 일지 패턴 태그로 기존 원칙 카운트 보강 (max 병합, INSERT 없음)

use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};

use stockbot_core::now_kst_iso;
use stockbot_data::principles::PrincipleRepository;

use crate::journal::JournalRecorder;

/// 원칙 등록 최소 거래 건수.
const MIN_SAMPLE: i64 = 5;
/// high confidence 기준 승률 (%).
const HIGH_CONF: f64 = 65.0;
/// medium confidence 기준 승률 (%).
const MED_CONF: f64 = 50.0;

/// 배치 결과.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub inserted: usize,
    pub updated: usize,
    pub total_principles: i64,
}

#[derive(Debug, FromRow)]
struct TriggerGroup {
    trigger_source: String,
    total: i64,
    wins: i64,
}

/// 승률 + 샘플 수 → confidence 레벨.
fn calc_confidence(win_rate: f64, total: i64) -> &'static str {
    if total < MIN_SAMPLE {
        "low"
    } else if win_rate >= HIGH_CONF {
        "high"
    } else if win_rate >= MED_CONF {
        "medium"
    } else {
        "low"
    }
}

/// 원칙 추출기.
pub struct PrinciplesExtractor {
    pool: SqlitePool,
    journal: JournalRecorder,
}

impl PrinciplesExtractor {
    pub fn new(pool: SqlitePool, journal: JournalRecorder) -> Self {
        Self { pool, journal }
    }

    /// 주간 배치 실행.
    pub async fn run_weekly_extraction(&self) -> ExtractionResult {
        info!("매매 원칙 추출 배치 시작");
        let mut result = ExtractionResult::default();

        let groups = match self.aggregate_by_trigger().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!("집계 실패: {}", e);
                return result;
            }
        };
        if groups.is_empty() {
            info!("집계할 거래 데이터 없음");
            return result;
        }

        let now = now_kst_iso();

        for group in &groups {
            let win_rate = if group.total > 0 {
                (group.wins as f64 / group.total as f64 * 1000.0).round() / 10.0
            } else {
                0.0
            };
            let confidence = calc_confidence(win_rate, group.total);
            let summary = format!("{}/{} 성공", group.wins, group.total);

            match PrincipleRepository::find_by_trigger(&self.pool, &group.trigger_source).await {
                Ok(Some(row)) => {
                    if let Err(e) = PrincipleRepository::update_stats(
                        &self.pool,
                        row.id,
                        group.wins,
                        group.total,
                        win_rate,
                        &summary,
                        confidence,
                        &now,
                    )
                    .await
                    {
                        warn!("{} 원칙 갱신 실패: {}", group.trigger_source, e);
                        continue;
                    }
                    result.updated += 1;
                }
                Ok(None) => {
                    // 샘플 수 미달이면 신규 등록 건너뜀
                    if group.total < MIN_SAMPLE {
                        debug!(
                            "{} 샘플 부족 ({}건 < {}) — 건너뜀",
                            group.trigger_source, group.total, MIN_SAMPLE
                        );
                        continue;
                    }
                    let condition = format!("트리거: {}", group.trigger_source);
                    if let Err(e) = PrincipleRepository::insert(
                        &self.pool,
                        &group.trigger_source,
                        &condition,
                        "buy",
                        &summary,
                        group.wins,
                        group.total,
                        win_rate,
                        confidence,
                        &now,
                    )
                    .await
                    {
                        warn!("{} 원칙 등록 실패: {}", group.trigger_source, e);
                        continue;
                    }
                    result.inserted += 1;
                }
                Err(e) => {
                    warn!("{} 원칙 조회 실패: {}", group.trigger_source, e);
                    continue;
                }
            }
        }

        result.total_principles = PrincipleRepository::count(&self.pool).await.unwrap_or(0);

        info!(
            "배치 완료 — 신규:{} 업데이트:{} 총 원칙:{}개",
            result.inserted, result.updated, result.total_principles
        );

        // 일지 패턴 태그로 기존 원칙 보강
        self.integrate_journal_patterns().await;

        result
    }

    /// trigger_source별 총 거래 수 + 수익 거래 수 집계 (청산 완료만).
    async fn aggregate_by_trigger(&self) -> Result<Vec<TriggerGroup>, sqlx::Error> {
        sqlx::query_as::<_, TriggerGroup>(
            r#"
            SELECT
                COALESCE(trigger_source, 'unknown')            AS trigger_source,
                COUNT(*)                                       AS total,
                SUM(CASE WHEN close_reason IN
                    ('take_profit_1', 'take_profit_2') THEN 1 ELSE 0 END) AS wins
            FROM trading_history
            WHERE sell_time IS NOT NULL
            GROUP BY trigger_source
            HAVING COUNT(*) > 0
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// 30일 일지 패턴 태그 → 기존 원칙 보강.
    ///
    /// INSERT 없음 — 태그와 매칭되는 기존 원칙의 카운트를 max로 병합한다.
    async fn integrate_journal_patterns(&self) {
        let patterns = self.journal.get_weekly_patterns(30).await;
        if patterns.is_empty() {
            debug!("journal 패턴 없음 — 보강 건너뜀");
            return;
        }

        let now = now_kst_iso();
        let mut updated = 0;

        for pattern in &patterns {
            if pattern.count < MIN_SAMPLE {
                continue;
            }
            let row = match PrincipleRepository::find_by_tag(&self.pool, &pattern.tag).await {
                Ok(Some(row)) => row,
                Ok(None) => continue,
                Err(e) => {
                    warn!("패턴 원칙 조회 실패: {}", e);
                    continue;
                }
            };

            // 중복 방지: 기존값보다 클 때만 반영
            let new_total = row.total_count.max(pattern.count);
            let new_win = row.win_count.max(pattern.win_count);
            let confidence = calc_confidence(pattern.win_rate, new_total);

            if PrincipleRepository::update_stats(
                &self.pool,
                row.id,
                new_win,
                new_total,
                pattern.win_rate,
                row.result_summary.as_deref().unwrap_or(""),
                confidence,
                &now,
            )
            .await
            .is_ok()
            {
                updated += 1;
            }
        }

        if updated > 0 {
            info!("journal 패턴 보강 완료 — {}개 원칙 갱신", updated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stockbot_analysis::GeminiClient;
    use stockbot_data::store;

    async fn setup() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = store::open_pool(path.to_str().unwrap()).await.unwrap();
        store::init_db(&pool).await.unwrap();
        (dir, pool)
    }

    async fn seed_trade(pool: &SqlitePool, trigger: &str, close_reason: &str) {
        sqlx::query(
            r#"
            INSERT INTO trading_history
                (ticker, name, buy_time, sell_time, buy_price, sell_price, qty,
                 profit_rate, profit_amount, trigger_source, close_reason, mode)
            VALUES ('000001', '종목', '2026-07-28T09:30:00+09:00',
                    '2026-07-28T10:30:00+09:00', 10000, 10500, 10,
                    5.0, 5000, ?, ?, 'VTS')
            "#,
        )
        .bind(trigger)
        .bind(close_reason)
        .execute(pool)
        .await
        .unwrap();
    }

    fn extractor(pool: &SqlitePool) -> PrinciplesExtractor {
        PrinciplesExtractor::new(
            pool.clone(),
            JournalRecorder::new(pool.clone(), Arc::new(GeminiClient::new(None))),
        )
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(calc_confidence(70.0, 10), "high");
        assert_eq!(calc_confidence(65.0, 10), "high");
        assert_eq!(calc_confidence(60.0, 10), "medium");
        assert_eq!(calc_confidence(50.0, 10), "medium");
        assert_eq!(calc_confidence(49.9, 10), "low");
        // 샘플 부족이면 승률 무관 low
        assert_eq!(calc_confidence(90.0, 3), "low");
    }

    #[tokio::test]
    async fn test_weekly_extraction_scenario() {
        let (_dir, pool) = setup().await;

        // volume 트리거 20건 중 12건 승리 → 승률 60% → medium
        for i in 0..20 {
            let reason = if i < 12 { "take_profit_1" } else { "stop_loss" };
            seed_trade(&pool, "volume", reason).await;
        }

        let result = extractor(&pool).run_weekly_extraction().await;
        assert_eq!(result.inserted, 1);
        assert_eq!(result.total_principles, 1);

        let row = PrincipleRepository::find_by_trigger(&pool, "volume")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.total_count, 20);
        assert_eq!(row.win_count, 12);
        assert_eq!(row.win_rate, 60.0);
        assert_eq!(row.confidence, "medium");
    }

    #[tokio::test]
    async fn test_below_sample_skips_insert_but_updates_existing() {
        let (_dir, pool) = setup().await;

        // 3건뿐 — 신규 등록 안 됨
        for _ in 0..3 {
            seed_trade(&pool, "rate", "take_profit_1").await;
        }
        let result = extractor(&pool).run_weekly_extraction().await;
        assert_eq!(result.inserted, 0);

        // 기존 행이 있으면 샘플 부족이어도 UPDATE는 된다
        PrincipleRepository::insert(
            &pool, "rate", "트리거: rate", "buy", "1/2 성공", 1, 2, 50.0, "low",
            "2026-07-01T03:00:00+09:00",
        )
        .await
        .unwrap();

        let result = extractor(&pool).run_weekly_extraction().await;
        assert_eq!(result.updated, 1);
        let row = PrincipleRepository::find_by_trigger(&pool, "rate")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.total_count, 3);
        assert_eq!(row.win_rate, 100.0);
    }

    #[tokio::test]
    async fn test_open_trades_excluded() {
        let (_dir, pool) = setup().await;
        // sell_time NULL 행은 집계 대상 아님
        sqlx::query(
            "INSERT INTO trading_history (ticker, buy_time, trigger_source, mode) \
             VALUES ('000001', '2026-07-28T09:30:00+09:00', 'volume', 'VTS')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = extractor(&pool).run_weekly_extraction().await;
        assert_eq!(result.inserted, 0);
        assert_eq!(result.updated, 0);
    }
}
