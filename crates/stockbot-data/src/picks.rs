//! 당일 픽 저장.
//!
//! 같은 날짜 재실행(07:30 → 08:30)을 견디기 위해
//! 날짜별 삭제 후 재삽입을 한 트랜잭션으로 수행한다.
//! `signal_type`은 정규화된 값만 저장한다 (`공시` 원시 라벨 금지).

use sqlx::{FromRow, SqlitePool};
use tracing::info;

use stockbot_core::{now_kst_iso, CapTier, Pick, SignalType};

/// daily_picks 1행.
#[derive(Debug, Clone, FromRow)]
pub struct StoredPick {
    pub date: String,
    pub rank: i64,
    pub stock_code: String,
    pub stock_name: String,
    pub signal_type: String,
    pub cap_tier: String,
    pub reason: String,
    pub target_rate: String,
    pub stop_loss: String,
}

impl StoredPick {
    pub fn cap_tier(&self) -> CapTier {
        CapTier::parse(&self.cap_tier)
    }

    pub fn signal_type(&self) -> SignalType {
        SignalType::parse(&self.signal_type)
    }
}

pub struct PickRepository;

impl PickRepository {
    /// 해당 날짜 픽을 전부 교체한다 (삭제 후 재삽입, 단일 트랜잭션).
    pub async fn replace_for_date(
        pool: &SqlitePool,
        date: &str,
        picks: &[Pick],
    ) -> Result<(), sqlx::Error> {
        let created_at = now_kst_iso();
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM daily_picks WHERE date = ?")
            .bind(date)
            .execute(&mut *tx)
            .await?;

        for pick in picks {
            sqlx::query(
                r#"
                INSERT INTO daily_picks
                    (date, rank, stock_code, stock_name, signal_type, cap_tier,
                     reason, target_rate, stop_loss, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(date)
            .bind(pick.rank as i64)
            .bind(&pick.stock_code)
            .bind(&pick.stock_name)
            .bind(pick.category.signal_type().as_str())
            .bind(pick.cap_tier.as_str())
            .bind(&pick.reason)
            .bind(&pick.target_return)
            .bind(&pick.stop_loss)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(date, count = picks.len(), "daily_picks 저장 완료");
        Ok(())
    }

    /// 해당 날짜 픽 조회 (순위 순).
    pub async fn load_for_date(
        pool: &SqlitePool,
        date: &str,
    ) -> Result<Vec<StoredPick>, sqlx::Error> {
        sqlx::query_as::<_, StoredPick>(
            r#"
            SELECT date, rank, stock_code, stock_name, signal_type, cap_tier,
                   reason, target_rate, stop_loss
            FROM daily_picks
            WHERE date = ?
            ORDER BY rank ASC
            "#,
        )
        .bind(date)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_util::test_pool;
    use stockbot_core::PickCategory;

    fn pick(code: &str, rank: u32, category: PickCategory) -> Pick {
        Pick {
            rank,
            stock_code: code.to_string(),
            stock_name: format!("종목{}", rank),
            reason: "근거".to_string(),
            category,
            target_return: "20%".to_string(),
            stop_loss: "-5%".to_string(),
            is_theme: false,
            entry_window: String::new(),
            cap_tier: CapTier::Small300,
        }
    }

    #[tokio::test]
    async fn test_replace_is_delete_then_insert() {
        let (_dir, pool) = test_pool().await;

        // 07:30 실행: 2건
        PickRepository::replace_for_date(
            &pool,
            "20260803",
            &[
                pick("005930", 1, PickCategory::Filing),
                pick("123456", 2, PickCategory::Theme),
            ],
        )
        .await
        .unwrap();

        // 08:30 재실행: 1건으로 교체
        PickRepository::replace_for_date(&pool, "20260803", &[pick("654321", 1, PickCategory::Rotation)])
            .await
            .unwrap();

        let rows = PickRepository::load_for_date(&pool, "20260803").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stock_code, "654321");
    }

    #[tokio::test]
    async fn test_signal_type_normalized_on_write() {
        let (_dir, pool) = test_pool().await;
        PickRepository::replace_for_date(&pool, "20260803", &[pick("005930", 1, PickCategory::Filing)])
            .await
            .unwrap();

        let rows = PickRepository::load_for_date(&pool, "20260803").await.unwrap();
        // 공시 → DART_공시 정규화 확인
        assert_eq!(rows[0].signal_type, "DART_공시");
    }
}
