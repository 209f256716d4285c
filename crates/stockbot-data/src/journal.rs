//! 매매 일지 저장소.
//!
//! 일지 행은 compression_layer 1(원문) → 2(요약) → 3(핵심 한 줄)으로
//! 주간 배치에서 단계적으로 압축된다.

use sqlx::{FromRow, SqlitePool};

/// 일지 신규 행.
#[derive(Debug, Clone)]
pub struct NewJournalEntry {
    pub trading_id: i64,
    pub ticker: String,
    pub name: String,
    pub buy_time: String,
    pub sell_time: String,
    pub buy_price: i64,
    pub sell_price: i64,
    pub profit_rate: f64,
    pub trigger_source: String,
    pub close_reason: String,
    pub market_env: String,
    /// JSON 직렬화된 상황 분석
    pub situation_analysis: String,
    /// JSON 직렬화된 판단 평가
    pub judgment_evaluation: String,
    /// JSON 직렬화된 교훈 목록
    pub lessons: String,
    /// JSON 직렬화된 패턴 태그 목록
    pub pattern_tags: String,
    pub one_line_summary: String,
    pub created_at: String,
}

/// 압축 대상 행.
#[derive(Debug, Clone, FromRow)]
pub struct CompressionRow {
    pub id: i64,
    pub ticker: Option<String>,
    pub name: Option<String>,
    pub profit_rate: Option<f64>,
    pub close_reason: Option<String>,
    pub situation_analysis: Option<String>,
    pub judgment_evaluation: Option<String>,
    pub lessons: Option<String>,
    pub one_line_summary: Option<String>,
    pub summary_text: Option<String>,
}

/// 주간 패턴 집계용 행.
#[derive(Debug, Clone, FromRow)]
pub struct PatternAggRow {
    pub pattern_tags: Option<String>,
    pub profit_rate: Option<f64>,
    pub lessons: Option<String>,
}

pub struct JournalRepository;

impl JournalRepository {
    /// 일지 1행 삽입. 반환: trading_journal.id
    pub async fn insert(pool: &SqlitePool, entry: &NewJournalEntry) -> Result<i64, sqlx::Error> {
        let id = sqlx::query(
            r#"
            INSERT INTO trading_journal
                (trading_id, ticker, name, buy_time, sell_time,
                 buy_price, sell_price, profit_rate,
                 trigger_source, close_reason, market_env,
                 situation_analysis, judgment_evaluation,
                 lessons, pattern_tags, one_line_summary, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.trading_id)
        .bind(&entry.ticker)
        .bind(&entry.name)
        .bind(&entry.buy_time)
        .bind(&entry.sell_time)
        .bind(entry.buy_price)
        .bind(entry.sell_price)
        .bind(entry.profit_rate)
        .bind(&entry.trigger_source)
        .bind(&entry.close_reason)
        .bind(&entry.market_env)
        .bind(&entry.situation_analysis)
        .bind(&entry.judgment_evaluation)
        .bind(&entry.lessons)
        .bind(&entry.pattern_tags)
        .bind(&entry.one_line_summary)
        .bind(&entry.created_at)
        .execute(pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// 해당 계층에서 cutoff(YYYY-MM-DD)보다 오래된 행.
    pub async fn rows_older_than(
        pool: &SqlitePool,
        layer: i64,
        cutoff_date: &str,
    ) -> Result<Vec<CompressionRow>, sqlx::Error> {
        sqlx::query_as::<_, CompressionRow>(
            r#"
            SELECT id, ticker, name, profit_rate, close_reason,
                   situation_analysis, judgment_evaluation, lessons,
                   one_line_summary, summary_text
            FROM trading_journal
            WHERE compression_layer = ? AND DATE(created_at) < ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(layer)
        .bind(cutoff_date)
        .fetch_all(pool)
        .await
    }

    /// Layer 1 → 2 승격: 요약 저장.
    pub async fn promote_to_layer2(
        pool: &SqlitePool,
        id: i64,
        summary_text: &str,
        compressed_at: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE trading_journal
            SET compression_layer = 2, summary_text = ?, compressed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(summary_text)
        .bind(compressed_at)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Layer 2 → 3 승격: 핵심 한 줄만 남기고 상세 JSON 초기화.
    pub async fn promote_to_layer3(
        pool: &SqlitePool,
        id: i64,
        core_text: &str,
        compressed_at: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE trading_journal
            SET compression_layer = 3,
                summary_text = ?,
                compressed_at = ?,
                situation_analysis = '{}',
                judgment_evaluation = '{}',
                lessons = '[]'
            WHERE id = ?
            "#,
        )
        .bind(core_text)
        .bind(compressed_at)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Layer 3 90일+ 행 최종 정리. 정리된 행 수 반환.
    pub async fn clean_old_layer3(
        pool: &SqlitePool,
        cutoff_date: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE trading_journal
            SET summary_text = SUBSTR(COALESCE(summary_text, one_line_summary, ''), 1, 30),
                situation_analysis = '{}',
                judgment_evaluation = '{}'
            WHERE compression_layer = 3 AND DATE(created_at) < ?
            "#,
        )
        .bind(cutoff_date)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// since(ISO) 이후 패턴 집계용 행.
    pub async fn pattern_rows_since(
        pool: &SqlitePool,
        since_iso: &str,
    ) -> Result<Vec<PatternAggRow>, sqlx::Error> {
        sqlx::query_as::<_, PatternAggRow>(
            "SELECT pattern_tags, profit_rate, lessons FROM trading_journal WHERE created_at >= ?",
        )
        .bind(since_iso)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_util::test_pool;

    pub(crate) fn entry(created_at: &str) -> NewJournalEntry {
        NewJournalEntry {
            trading_id: 1,
            ticker: "005930".to_string(),
            name: "삼성전자".to_string(),
            buy_time: "2026-07-01T09:30:00+09:00".to_string(),
            sell_time: "2026-07-01T10:30:00+09:00".to_string(),
            buy_price: 10_000,
            sell_price: 10_500,
            profit_rate: 5.0,
            trigger_source: "watchlist".to_string(),
            close_reason: "take_profit_1".to_string(),
            market_env: "강세장".to_string(),
            situation_analysis: "{}".to_string(),
            judgment_evaluation: "{}".to_string(),
            lessons: "[]".to_string(),
            pattern_tags: r#"["원칙준수익절"]"#.to_string(),
            one_line_summary: "목표 도달 후 익절".to_string(),
            created_at: created_at.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_layer_promotion() {
        let (_dir, pool) = test_pool().await;
        let id = JournalRepository::insert(&pool, &entry("2026-07-01T10:30:00+09:00"))
            .await
            .unwrap();

        // Layer 1 → 2
        let rows = JournalRepository::rows_older_than(&pool, 1, "2026-07-25").await.unwrap();
        assert_eq!(rows.len(), 1);
        JournalRepository::promote_to_layer2(&pool, id, "+5.0% 1차익절 요약", "2026-08-02T03:30:00+09:00")
            .await
            .unwrap();

        // 승격 후 Layer 1 대상에서 빠진다
        let rows = JournalRepository::rows_older_than(&pool, 1, "2026-07-25").await.unwrap();
        assert!(rows.is_empty());

        // Layer 2 → 3
        let rows = JournalRepository::rows_older_than(&pool, 2, "2026-08-02").await.unwrap();
        assert_eq!(rows.len(), 1);
        JournalRepository::promote_to_layer3(&pool, id, "+5.0% 1차익절", "2026-08-02T03:30:00+09:00")
            .await
            .unwrap();

        let (layer, lessons): (i64, String) =
            sqlx::query_as("SELECT compression_layer, lessons FROM trading_journal WHERE id = ?")
                .bind(id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(layer, 3);
        assert_eq!(lessons, "[]");
    }
}
