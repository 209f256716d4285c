//! 매매 원칙 저장소.
//!
//! (trigger_source, action) 키로 UPSERT되는 통계 행.
//! 신규 INSERT는 트리거 집계 배치만 수행하고,
//! 일지 패턴 보강은 기존 행 UPDATE만 한다.

use sqlx::{FromRow, SqlitePool};

/// trading_principles 1행.
#[derive(Debug, Clone, FromRow)]
pub struct PrincipleRow {
    pub id: i64,
    pub condition_desc: Option<String>,
    pub action: Option<String>,
    pub result_summary: Option<String>,
    pub win_count: i64,
    pub total_count: i64,
    pub win_rate: f64,
    pub confidence: String,
    pub trigger_source: Option<String>,
}

pub struct PrincipleRepository;

impl PrincipleRepository {
    /// (trigger_source, action='buy') 기존 행 조회.
    pub async fn find_by_trigger(
        pool: &SqlitePool,
        trigger_source: &str,
    ) -> Result<Option<PrincipleRow>, sqlx::Error> {
        sqlx::query_as::<_, PrincipleRow>(
            r#"
            SELECT id, condition_desc, action, result_summary,
                   win_count, total_count, win_rate, confidence, trigger_source
            FROM trading_principles
            WHERE trigger_source = ? AND action = 'buy'
            "#,
        )
        .bind(trigger_source)
        .fetch_optional(pool)
        .await
    }

    /// 기존 행 통계 갱신.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_stats(
        pool: &SqlitePool,
        id: i64,
        win_count: i64,
        total_count: i64,
        win_rate: f64,
        result_summary: &str,
        confidence: &str,
        now_iso: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE trading_principles
            SET win_count = ?, total_count = ?, win_rate = ?,
                result_summary = ?, confidence = ?, last_updated = ?
            WHERE id = ?
            "#,
        )
        .bind(win_count)
        .bind(total_count)
        .bind(win_rate)
        .bind(result_summary)
        .bind(confidence)
        .bind(now_iso)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// 신규 원칙 삽입 (action='buy').
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        pool: &SqlitePool,
        trigger_source: &str,
        condition_desc: &str,
        action: &str,
        result_summary: &str,
        win_count: i64,
        total_count: i64,
        win_rate: f64,
        confidence: &str,
        now_iso: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO trading_principles
                (created_at, condition_desc, action, result_summary,
                 win_count, total_count, win_rate, confidence, trigger_source, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(now_iso)
        .bind(condition_desc)
        .bind(action)
        .bind(result_summary)
        .bind(win_count)
        .bind(total_count)
        .bind(win_rate)
        .bind(confidence)
        .bind(trigger_source)
        .bind(now_iso)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// 태그와 매칭되는 원칙 검색 (condition_desc/action LIKE).
    pub async fn find_by_tag(
        pool: &SqlitePool,
        tag: &str,
    ) -> Result<Option<PrincipleRow>, sqlx::Error> {
        let like = format!("%{}%", tag);
        sqlx::query_as::<_, PrincipleRow>(
            r#"
            SELECT id, condition_desc, action, result_summary,
                   win_count, total_count, win_rate, confidence, trigger_source
            FROM trading_principles
            WHERE condition_desc LIKE ? OR action LIKE ?
            "#,
        )
        .bind(&like)
        .bind(&like)
        .fetch_optional(pool)
        .await
    }

    /// 전체 원칙 수.
    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trading_principles")
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }

    /// 신뢰도·승률 순 상위 원칙 (/principles 명령용).
    pub async fn top(pool: &SqlitePool, limit: i64) -> Result<Vec<PrincipleRow>, sqlx::Error> {
        sqlx::query_as::<_, PrincipleRow>(
            r#"
            SELECT id, condition_desc, action, result_summary,
                   win_count, total_count, win_rate, confidence, trigger_source
            FROM trading_principles
            ORDER BY CASE confidence WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END,
                     win_rate DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
