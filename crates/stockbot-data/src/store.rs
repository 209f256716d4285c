//! DB 풀 생성 + 멱등 스키마 초기화.
//!
//! DDL + `init_db()` + `open_pool()`만 담당한다. 분석·발송·수집 로직 없음.
//! `init_db()`는 시작 시 1회 호출되며, 이미 존재하는 객체는 변경하지 않는다
//! (IF NOT EXISTS). 초기화 실패는 치명적이다 — 프로세스가 종료된다.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// 스키마 DDL — 테이블·인덱스·뷰를 한 번에 생성한다.
const DDL: &[&str] = &[
    // ── 1. 알림 이력 ──────────────────────────────────────────
    r#"
    CREATE TABLE IF NOT EXISTS alert_history (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        ticker         TEXT    NOT NULL,
        name           TEXT,
        alert_time     TEXT    NOT NULL,   -- ISO 8601 KST
        alert_date     TEXT    NOT NULL,   -- YYYYMMDD
        change_rate    REAL,               -- 알림 시점 누적 등락률 (%)
        delta_rate     REAL,               -- 직전대비 추가 등락률 (%)
        source         TEXT,               -- volume / rate / websocket / gap_up / watchlist
        price_at_alert INTEGER             -- 알림 시점 현재가 (원)
    )
    "#,
    // ── 2. 수익률 추적 ────────────────────────────────────────
    r#"
    CREATE TABLE IF NOT EXISTS performance_tracker (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        alert_id         INTEGER REFERENCES alert_history(id),
        ticker           TEXT    NOT NULL,
        alert_date       TEXT    NOT NULL,
        price_at_alert   INTEGER,
        tracked_date_1d  TEXT,
        tracked_date_3d  TEXT,
        tracked_date_7d  TEXT,
        price_1d   INTEGER,
        price_3d   INTEGER,
        price_7d   INTEGER,
        return_1d  REAL,
        return_3d  REAL,
        return_7d  REAL,
        done_1d  INTEGER DEFAULT 0,
        done_3d  INTEGER DEFAULT 0,
        done_7d  INTEGER DEFAULT 0
    )
    "#,
    // ── 3. 매매 이력 ──────────────────────────────────────────
    r#"
    CREATE TABLE IF NOT EXISTS trading_history (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        ticker             TEXT,
        name               TEXT,
        buy_time           TEXT,               -- ISO 8601 KST
        sell_time          TEXT,               -- NULL = 미청산
        buy_price          INTEGER,
        sell_price         INTEGER,
        qty                INTEGER,
        profit_rate        REAL,
        profit_amount      INTEGER,
        trigger_source     TEXT,
        close_reason       TEXT,               -- take_profit_1 / ... / final_close / manual
        mode               TEXT DEFAULT 'VTS',
        pick_type          TEXT DEFAULT 'swing',
        buy_market_context TEXT,               -- 예: "강세장 KOSPI2547"
        sector             TEXT
    )
    "#,
    // ── 4. 오픈 포지션 ────────────────────────────────────────
    r#"
    CREATE TABLE IF NOT EXISTS positions (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        trading_id      INTEGER REFERENCES trading_history(id),
        ticker          TEXT    NOT NULL,
        name            TEXT,
        buy_time        TEXT    NOT NULL,
        buy_price       INTEGER NOT NULL,
        qty             INTEGER NOT NULL,
        trigger_source  TEXT,
        mode            TEXT DEFAULT 'VTS',
        pick_type       TEXT DEFAULT 'swing',  -- day_trade / swing
        peak_price      INTEGER,               -- check_exit가 갱신
        stop_loss_price INTEGER,               -- 픽 손절기준이 가격일 때만
        market_env      TEXT,                  -- 진입 시점 환경
        sector          TEXT
    )
    "#,
    // ── 5. 당일 픽 ────────────────────────────────────────────
    r#"
    CREATE TABLE IF NOT EXISTS daily_picks (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        date        TEXT NOT NULL,              -- YYYYMMDD
        rank        INTEGER,
        stock_code  TEXT,
        stock_name  TEXT,
        signal_type TEXT,                       -- 정규화된 신호 유형
        cap_tier    TEXT,
        reason      TEXT,
        target_rate TEXT,
        stop_loss   TEXT,
        created_at  TEXT
    )
    "#,
    // ── 6. RAG 패턴 (write-only) ──────────────────────────────
    r#"
    CREATE TABLE IF NOT EXISTS rag_patterns (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        date         TEXT NOT NULL,
        signal_type  TEXT NOT NULL,
        stock_name   TEXT,
        stock_code   TEXT,
        cap_tier     TEXT,
        was_picked   INTEGER NOT NULL,
        pick_rank    INTEGER,
        max_return   REAL,
        hit_20pct    INTEGER DEFAULT 0,
        hit_upper    INTEGER DEFAULT 0,
        pattern_memo TEXT,
        created_at   TEXT
    )
    "#,
    // ── 7. 매매 원칙 ──────────────────────────────────────────
    r#"
    CREATE TABLE IF NOT EXISTS trading_principles (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at     TEXT,
        condition_desc TEXT,
        action         TEXT,
        result_summary TEXT,
        win_count      INTEGER DEFAULT 0,
        total_count    INTEGER DEFAULT 0,
        win_rate       REAL    DEFAULT 0,
        confidence     TEXT    DEFAULT 'low',
        trigger_source TEXT,
        last_updated   TEXT,
        UNIQUE (trigger_source, action)
    )
    "#,
    // ── 8. 매매 일지 ──────────────────────────────────────────
    r#"
    CREATE TABLE IF NOT EXISTS trading_journal (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        trading_id          INTEGER REFERENCES trading_history(id),
        ticker              TEXT,
        name                TEXT,
        buy_time            TEXT,
        sell_time           TEXT,
        buy_price           INTEGER,
        sell_price          INTEGER,
        profit_rate         REAL,
        trigger_source      TEXT,
        close_reason        TEXT,
        market_env          TEXT,
        situation_analysis  TEXT DEFAULT '{}',  -- JSON
        judgment_evaluation TEXT DEFAULT '{}',  -- JSON
        lessons             TEXT DEFAULT '[]',  -- JSON
        pattern_tags        TEXT DEFAULT '[]',  -- JSON
        one_line_summary    TEXT,
        summary_text        TEXT,
        compression_layer   INTEGER DEFAULT 1,
        compressed_at       TEXT,
        created_at          TEXT
    )
    "#,
    // ── 9. KOSPI 레벨별 승률 통계 ─────────────────────────────
    r#"
    CREATE TABLE IF NOT EXISTS kospi_index_stats (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        trade_date      TEXT,
        kospi_level     INTEGER,
        kospi_range     TEXT UNIQUE,            -- 예: "2400~2600"
        win_count       INTEGER DEFAULT 0,
        total_count     INTEGER DEFAULT 0,
        win_rate        REAL    DEFAULT 0,
        avg_profit_rate REAL    DEFAULT 0,
        last_updated    TEXT
    )
    "#,
    // ── 10. 테마 이벤트 이력 ──────────────────────────────────
    r#"
    CREATE TABLE IF NOT EXISTS theme_event_history (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        date             TEXT    NOT NULL,
        event_type       TEXT,
        event_summary    TEXT,
        signal_type      TEXT,
        triggered_sector TEXT    NOT NULL,
        top_ticker       TEXT,
        top_name         TEXT,
        top_change_pct   REAL,
        sector_avg_pct   REAL,
        created_at       TEXT DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    // ── 11. 테마 예측 정확도 (쓰는 모듈 없음 — 스키마 계약 유지) ─
    r#"
    CREATE TABLE IF NOT EXISTS theme_accuracy (
        date             TEXT PRIMARY KEY,
        predicted_themes TEXT,
        predicted_picks  TEXT,
        signal_sources   TEXT,
        created_at       TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS signal_weights (
        signal_type  TEXT PRIMARY KEY,
        weight       REAL DEFAULT 1.0,
        accuracy     REAL,
        sample_count INTEGER DEFAULT 0,
        last_updated TEXT
    )
    "#,
    // ── 12. 트리거별 승률 뷰 ──────────────────────────────────
    r#"
    CREATE VIEW IF NOT EXISTS trigger_stats AS
    SELECT
        ah.source                                                  AS trigger_type,
        COUNT(*)                                                   AS total_alerts,
        SUM(CASE WHEN pt.done_7d = 1 THEN 1 ELSE 0 END)            AS tracked_7d,
        SUM(CASE WHEN pt.return_7d > 0 THEN 1 ELSE 0 END)          AS win_7d,
        ROUND(
            100.0 * SUM(CASE WHEN pt.return_7d > 0 THEN 1 ELSE 0 END)
                  / NULLIF(SUM(CASE WHEN pt.done_7d = 1 THEN 1 ELSE 0 END), 0),
            1
        )                                                          AS win_rate_7d,
        ROUND(AVG(CASE WHEN pt.done_7d = 1 THEN pt.return_7d END), 2) AS avg_return_7d
    FROM alert_history ah
    LEFT JOIN performance_tracker pt ON pt.alert_id = ah.id
    GROUP BY ah.source
    "#,
    // ── 13. 인덱스 ────────────────────────────────────────────
    "CREATE INDEX IF NOT EXISTS idx_alert_date ON alert_history(alert_date)",
    "CREATE INDEX IF NOT EXISTS idx_perf_done ON performance_tracker(done_1d, done_3d, done_7d, alert_date)",
    "CREATE INDEX IF NOT EXISTS idx_positions_ticker ON positions(ticker)",
    "CREATE INDEX IF NOT EXISTS idx_trading_hist_date ON trading_history(buy_time)",
    "CREATE INDEX IF NOT EXISTS idx_picks_date ON daily_picks(date)",
    "CREATE INDEX IF NOT EXISTS idx_rag_sig_tier_date ON rag_patterns(signal_type, cap_tier, date)",
    "CREATE INDEX IF NOT EXISTS idx_journal_layer ON trading_journal(compression_layer, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_theme_history_date ON theme_event_history(date)",
];

/// SQLite 풀 생성. 파일·상위 디렉터리가 없으면 만든다.
pub async fn open_pool(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| sqlx::Error::Io(e))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// 테이블·인덱스·뷰 일괄 초기화 (멱등).
pub async fn init_db(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in DDL {
        sqlx::query(stmt).execute(pool).await?;
    }
    info!("DB 초기화 완료");
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// 임시 파일 기반 테스트 DB.
    pub async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = open_pool(path.to_str().unwrap()).await.unwrap();
        init_db(&pool).await.unwrap();
        (dir, pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_db_idempotent() {
        let (_dir, pool) = test_util::test_pool().await;
        // 두 번째 호출도 에러 없이 통과해야 한다
        init_db(&pool).await.unwrap();
        init_db(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_all_tables_exist() {
        let (_dir, pool) = test_util::test_pool().await;
        for table in [
            "alert_history",
            "performance_tracker",
            "trading_history",
            "positions",
            "daily_picks",
            "rag_patterns",
            "trading_principles",
            "trading_journal",
            "kospi_index_stats",
            "theme_event_history",
            "theme_accuracy",
            "signal_weights",
        ] {
            let row: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(row.0, 1, "{} 테이블 없음", table);
        }

        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='view' AND name = 'trigger_stats'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row.0, 1, "trigger_stats 뷰 없음");
    }
}
