//! RAG 패턴 누적.
//!
//! 매일 배치 후 두 종류 행을 쌓는다:
//! - 픽된 종목: `was_picked=true` + 순위 + 실현 결과
//! - 픽 밖인데 급등한 종목: `was_picked=false` ("놓친 것" 비교 학습용)
//!
//! 신호 유형은 항상 정규화된 값으로 저장된다 — 원시 라벨 `공시`는
//! [`stockbot_core::SignalType::parse`]가 `DART_공시`로 변환한다.

use std::collections::{HashMap, HashSet};

use sqlx::SqlitePool;
use tracing::info;

use stockbot_core::{now_kst_iso, CapTier, SignalType};
use stockbot_data::picks::StoredPick;
use stockbot_data::rag::{NewRagPattern, RagRepository};

/// 당일 실현 결과 1건.
#[derive(Debug, Clone)]
pub struct DayOutcome {
    pub code: String,
    pub name: String,
    /// 당일 최고 등락률 (%)
    pub max_return: Option<f64>,
    pub hit_20pct: bool,
    pub hit_upper: bool,
    pub signal_type: SignalType,
    pub cap_tier: CapTier,
    pub memo: String,
}

pub struct RagStore;

impl RagStore {
    /// 당일 픽 + 실현 결과 → rag_patterns 벌크 저장.
    pub async fn save(
        pool: &SqlitePool,
        date: &str,
        picks: &[StoredPick],
        outcomes: &[DayOutcome],
    ) -> Result<usize, sqlx::Error> {
        if picks.is_empty() && outcomes.is_empty() {
            info!("저장할 RAG 데이터 없음 — skip");
            return Ok(0);
        }

        let outcome_map: HashMap<&str, &DayOutcome> =
            outcomes.iter().map(|o| (o.code.as_str(), o)).collect();

        let mut rows = Vec::new();
        let mut picked_codes: HashSet<&str> = HashSet::new();

        // ── 픽된 종목 ────────────────────────────────────────
        for pick in picks {
            let outcome = outcome_map.get(pick.stock_code.as_str());
            let memo = outcome
                .map(|o| o.memo.clone())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| pick.reason.clone());

            rows.push(NewRagPattern {
                date: date.to_string(),
                signal_type: pick.signal_type(),
                stock_name: pick.stock_name.clone(),
                stock_code: pick.stock_code.clone(),
                cap_tier: pick.cap_tier(),
                was_picked: true,
                pick_rank: Some(pick.rank),
                max_return: outcome.and_then(|o| o.max_return),
                hit_20pct: outcome.map(|o| o.hit_20pct).unwrap_or(false),
                hit_upper: outcome.map(|o| o.hit_upper).unwrap_or(false),
                pattern_memo: memo,
            });
            picked_codes.insert(pick.stock_code.as_str());
        }

        // ── 픽 외 급등 종목 (비교 학습용) ────────────────────
        for outcome in outcomes {
            if picked_codes.contains(outcome.code.as_str()) {
                continue;
            }
            rows.push(NewRagPattern {
                date: date.to_string(),
                signal_type: outcome.signal_type,
                stock_name: outcome.name.clone(),
                stock_code: outcome.code.clone(),
                cap_tier: outcome.cap_tier,
                was_picked: false,
                pick_rank: None,
                max_return: outcome.max_return,
                hit_20pct: outcome.hit_20pct,
                hit_upper: outcome.hit_upper,
                pattern_memo: outcome.memo.clone(),
            });
        }

        RagRepository::insert_patterns(pool, &now_kst_iso(), &rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbot_data::store;

    async fn setup() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = store::open_pool(path.to_str().unwrap()).await.unwrap();
        store::init_db(&pool).await.unwrap();
        (dir, pool)
    }

    fn stored_pick(code: &str, signal_type: &str) -> StoredPick {
        StoredPick {
            date: "20260803".to_string(),
            rank: 1,
            stock_code: code.to_string(),
            stock_name: format!("종목{}", code),
            signal_type: signal_type.to_string(),
            cap_tier: "소형_300억미만".to_string(),
            reason: "수주 공시".to_string(),
            target_rate: "20%".to_string(),
            stop_loss: "-5%".to_string(),
        }
    }

    fn outcome(code: &str, max_return: f64) -> DayOutcome {
        DayOutcome {
            code: code.to_string(),
            name: format!("종목{}", code),
            max_return: Some(max_return),
            hit_20pct: max_return >= 20.0,
            hit_upper: max_return >= 29.5,
            signal_type: SignalType::Unclassified,
            cap_tier: CapTier::Unclassified,
            memo: String::new(),
        }
    }

    #[tokio::test]
    async fn test_save_picked_and_missed_rows() {
        let (_dir, pool) = setup().await;

        let picks = vec![stored_pick("000001", "DART_공시")];
        let outcomes = vec![outcome("000001", 22.0), outcome("000002", 30.0)];

        let n = RagStore::save(&pool, "20260803", &picks, &outcomes).await.unwrap();
        assert_eq!(n, 2);

        // 픽된 종목
        let (picked, rank): (bool, Option<i64>) = sqlx::query_as(
            "SELECT was_picked, pick_rank FROM rag_patterns WHERE stock_code = '000001'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(picked);
        assert_eq!(rank, Some(1));

        // 놓친 종목
        let (picked, rank): (bool, Option<i64>) = sqlx::query_as(
            "SELECT was_picked, pick_rank FROM rag_patterns WHERE stock_code = '000002'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(!picked);
        assert!(rank.is_none());
    }

    #[tokio::test]
    async fn test_raw_filing_label_never_persisted() {
        let (_dir, pool) = setup().await;

        // 구버전 데이터가 원시 라벨을 들고 있어도 정규화돼 저장된다
        let picks = vec![stored_pick("000001", "공시")];
        RagStore::save(&pool, "20260803", &picks, &[]).await.unwrap();

        let (signal,): (String,) =
            sqlx::query_as("SELECT signal_type FROM rag_patterns WHERE stock_code = '000001'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(signal, "DART_공시");

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM rag_patterns WHERE signal_type = '공시'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_empty_inputs_skip() {
        let (_dir, pool) = setup().await;
        let n = RagStore::save(&pool, "20260803", &[], &[]).await.unwrap();
        assert_eq!(n, 0);
    }
}
