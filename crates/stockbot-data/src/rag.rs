//! RAG 패턴 저장소 (write-only 로그).
//!
//! - 삽입은 벌크 + 단일 트랜잭션
//! - 조회는 (signal_type, cap_tier) 정확 일치 → 0건이면 signal_type 단독 완화

use sqlx::{FromRow, SqlitePool};
use tracing::info;

use stockbot_core::{CapTier, SignalType};

/// rag_patterns 삽입 1행.
#[derive(Debug, Clone)]
pub struct NewRagPattern {
    /// YYYYMMDD
    pub date: String,
    pub signal_type: SignalType,
    pub stock_name: String,
    pub stock_code: String,
    pub cap_tier: CapTier,
    pub was_picked: bool,
    pub pick_rank: Option<i64>,
    pub max_return: Option<f64>,
    pub hit_20pct: bool,
    pub hit_upper: bool,
    pub pattern_memo: String,
}

/// (signal_type, cap_tier) 구간 통계.
#[derive(Debug, Clone, Default, FromRow)]
pub struct PatternStats {
    pub total: i64,
    pub hit20: Option<i64>,
    pub hit_upper: Option<i64>,
    pub avg_return: Option<f64>,
}

/// 최근 사례 1건.
#[derive(Debug, Clone, FromRow)]
pub struct RecentPattern {
    pub date: String,
    pub stock_name: Option<String>,
    pub max_return: Option<f64>,
    pub hit_20pct: i64,
    pub hit_upper: i64,
    pub pattern_memo: Option<String>,
}

pub struct RagRepository;

impl RagRepository {
    /// 패턴 벌크 삽입 (단일 트랜잭션). 갱신은 없다 — write-only.
    pub async fn insert_patterns(
        pool: &SqlitePool,
        created_at: &str,
        rows: &[NewRagPattern],
    ) -> Result<usize, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO rag_patterns
                    (date, signal_type, stock_name, stock_code, cap_tier,
                     was_picked, pick_rank, max_return, hit_20pct, hit_upper,
                     pattern_memo, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.date)
            .bind(row.signal_type.as_str())
            .bind(&row.stock_name)
            .bind(&row.stock_code)
            .bind(row.cap_tier.as_str())
            .bind(row.was_picked)
            .bind(row.pick_rank)
            .bind(row.max_return)
            .bind(row.hit_20pct)
            .bind(row.hit_upper)
            .bind(&row.pattern_memo)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(count = rows.len(), "RAG 패턴 저장 완료");
        Ok(rows.len())
    }

    /// (signal_type, cap_tier) 정확 일치 통계.
    pub async fn stats_exact(
        pool: &SqlitePool,
        signal_type: SignalType,
        cap_tier: CapTier,
    ) -> Result<PatternStats, sqlx::Error> {
        sqlx::query_as::<_, PatternStats>(
            r#"
            SELECT COUNT(*)                                       AS total,
                   SUM(CASE WHEN hit_20pct = 1 THEN 1 ELSE 0 END) AS hit20,
                   SUM(CASE WHEN hit_upper = 1 THEN 1 ELSE 0 END) AS hit_upper,
                   AVG(max_return)                                AS avg_return
            FROM rag_patterns
            WHERE signal_type = ? AND cap_tier = ?
            "#,
        )
        .bind(signal_type.as_str())
        .bind(cap_tier.as_str())
        .fetch_one(pool)
        .await
    }

    /// signal_type 단독 통계 (cap_tier 완화).
    pub async fn stats_by_signal(
        pool: &SqlitePool,
        signal_type: SignalType,
    ) -> Result<PatternStats, sqlx::Error> {
        sqlx::query_as::<_, PatternStats>(
            r#"
            SELECT COUNT(*)                                       AS total,
                   SUM(CASE WHEN hit_20pct = 1 THEN 1 ELSE 0 END) AS hit20,
                   SUM(CASE WHEN hit_upper = 1 THEN 1 ELSE 0 END) AS hit_upper,
                   AVG(max_return)                                AS avg_return
            FROM rag_patterns
            WHERE signal_type = ?
            "#,
        )
        .bind(signal_type.as_str())
        .fetch_one(pool)
        .await
    }

    /// 유사패턴 검색 → 프롬프트 삽입용 텍스트 블록.
    ///
    /// 1차: (signal_type, cap_tier) 정확 일치. 0건이면 signal_type 단독으로
    /// 완화한다. 그래도 없으면 빈 문자열 (축적된 이력 없음 신호).
    pub async fn similar_patterns_block(
        pool: &SqlitePool,
        signal_type: SignalType,
        cap_tier: CapTier,
        limit: i64,
    ) -> Result<String, sqlx::Error> {
        let mut stats = Self::stats_exact(pool, signal_type, cap_tier).await?;
        if stats.total == 0 {
            stats = Self::stats_by_signal(pool, signal_type).await?;
            if stats.total == 0 {
                return Ok(String::new());
            }
        }

        let total = stats.total;
        let hit20 = stats.hit20.unwrap_or(0);
        let hit_upper = stats.hit_upper.unwrap_or(0);
        let pct20 = (hit20 as f64 / total as f64 * 1000.0).round() / 10.0;
        let pct_up = (hit_upper as f64 / total as f64 * 1000.0).round() / 10.0;
        let avg = stats
            .avg_return
            .map(|v| (v * 10.0).round() / 10.0)
            .unwrap_or(0.0);

        let mut lines = vec![
            format!("[RAG 과거패턴] {} / {}", signal_type, cap_tier),
            format!(
                "총 {}건: 20%+ {}건({}%), 상한가 {}건({}%), 평균최고등락 {}%",
                total, hit20, pct20, hit_upper, pct_up, avg
            ),
        ];

        let recent = Self::recent(pool, signal_type, cap_tier, limit).await?;
        if !recent.is_empty() {
            lines.push("최근 사례:".to_string());
            for row in recent {
                let result_tag = if row.hit_upper == 1 {
                    "상한가".to_string()
                } else if row.hit_20pct == 1 {
                    "20%+".to_string()
                } else {
                    format!("{:.1}%", row.max_return.unwrap_or(0.0))
                };
                let memo = row.pattern_memo.unwrap_or_default();
                let memo_part = if memo.is_empty() {
                    String::new()
                } else {
                    format!(" — {}", memo.chars().take(60).collect::<String>())
                };
                lines.push(format!(
                    "  {} {}: {}{}",
                    row.date,
                    row.stock_name.unwrap_or_default(),
                    result_tag,
                    memo_part
                ));
            }
        }

        Ok(lines.join("\n"))
    }

    /// 최근 사례 — 정확 일치, 0건이면 signal_type 단독으로 완화.
    pub async fn recent(
        pool: &SqlitePool,
        signal_type: SignalType,
        cap_tier: CapTier,
        limit: i64,
    ) -> Result<Vec<RecentPattern>, sqlx::Error> {
        let rows = sqlx::query_as::<_, RecentPattern>(
            r#"
            SELECT date, stock_name, max_return, hit_20pct, hit_upper, pattern_memo
            FROM rag_patterns
            WHERE signal_type = ? AND cap_tier = ?
            ORDER BY date DESC
            LIMIT ?
            "#,
        )
        .bind(signal_type.as_str())
        .bind(cap_tier.as_str())
        .bind(limit)
        .fetch_all(pool)
        .await?;

        if !rows.is_empty() {
            return Ok(rows);
        }

        sqlx::query_as::<_, RecentPattern>(
            r#"
            SELECT date, stock_name, max_return, hit_20pct, hit_upper, pattern_memo
            FROM rag_patterns
            WHERE signal_type = ?
            ORDER BY date DESC
            LIMIT ?
            "#,
        )
        .bind(signal_type.as_str())
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_util::test_pool;

    fn pattern(code: &str, tier: CapTier, picked: bool) -> NewRagPattern {
        NewRagPattern {
            date: "20260727".to_string(),
            signal_type: SignalType::DartFiling,
            stock_name: format!("종목{}", code),
            stock_code: code.to_string(),
            cap_tier: tier,
            was_picked: picked,
            pick_rank: if picked { Some(1) } else { None },
            max_return: Some(22.5),
            hit_20pct: true,
            hit_upper: false,
            pattern_memo: "수주 공시 후 급등".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_exact_stats() {
        let (_dir, pool) = test_pool().await;
        RagRepository::insert_patterns(
            &pool,
            "2026-07-27T15:45:00+09:00",
            &[
                pattern("000001", CapTier::Small300, true),
                pattern("000002", CapTier::Small300, false),
            ],
        )
        .await
        .unwrap();

        let stats = RagRepository::stats_exact(&pool, SignalType::DartFiling, CapTier::Small300)
            .await
            .unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.hit20, Some(2));
        assert_eq!(stats.hit_upper, Some(0));
    }

    #[tokio::test]
    async fn test_similar_patterns_block_format() {
        let (_dir, pool) = test_pool().await;
        RagRepository::insert_patterns(
            &pool,
            "2026-07-27T15:45:00+09:00",
            &[
                pattern("000001", CapTier::Small300, true),
                pattern("000002", CapTier::Small300, false),
            ],
        )
        .await
        .unwrap();

        let block = RagRepository::similar_patterns_block(
            &pool,
            SignalType::DartFiling,
            CapTier::Small300,
            5,
        )
        .await
        .unwrap();

        assert!(block.starts_with("[RAG 과거패턴] DART_공시 / 소형_300억미만"));
        assert!(block.contains("총 2건: 20%+ 2건(100%)"));
        assert!(block.contains("최근 사례:"));
        assert!(block.contains("20260727"));

        // 이력 없는 조합은 빈 문자열
        let empty = RagRepository::similar_patterns_block(
            &pool,
            SignalType::Rotation,
            CapTier::Mid,
            5,
        )
        .await
        .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_recent_falls_back_to_signal_only() {
        let (_dir, pool) = test_pool().await;
        RagRepository::insert_patterns(
            &pool,
            "2026-07-27T15:45:00+09:00",
            &[pattern("000001", CapTier::Small1000, true)],
        )
        .await
        .unwrap();

        // cap_tier 불일치 → signal_type 단독으로 완화돼 1건 반환
        let rows = RagRepository::recent(&pool, SignalType::DartFiling, CapTier::Mid, 5)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        // signal_type 자체가 없으면 빈 결과
        let rows = RagRepository::recent(&pool, SignalType::Theme, CapTier::Mid, 5)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
