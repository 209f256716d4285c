//! 매매 일지 3계층 기억 압축 배치 (일요일 03:30).
//!
//! - Layer 1 (0~7일): 원문 전체 보존
//! - Layer 2 (8~30일): AI가 한 문단(80자 이내)으로 요약, AI 없으면 규칙 요약
//! - Layer 3 (31일+): 핵심 한 줄(50자)만, 상세 JSON 초기화
//! - 90일+: summary 30자 최종 트림
//!
//! 압축과 함께 KOSPI 레벨별(200포인트 구간) 승률 통계를 갱신한다.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use stockbot_analysis::GeminiClient;
use stockbot_core::{now_kst, now_kst_iso, CloseReason};
use stockbot_data::index_stats::IndexStatsRepository;
use stockbot_data::journal::{CompressionRow, JournalRepository};

/// KOSPI 레벨 구간 크기 (포인트).
const KOSPI_BUCKET_SIZE: i64 = 200;

/// 압축 결과.
#[derive(Debug, Clone, Default)]
pub struct CompressionResult {
    /// Layer1 → Layer2 압축 건수
    pub compressed_l1: usize,
    /// Layer2 → Layer3 압축 건수
    pub compressed_l2: usize,
    /// 90일+ 정리 건수
    pub cleaned: u64,
    /// AI 없어 규칙 요약으로 대체된 건수
    pub skipped: usize,
    pub index_buckets_updated: usize,
    pub index_trades_analyzed: usize,
}

/// 기억 압축기.
pub struct MemoryCompressor {
    pool: SqlitePool,
    llm: Arc<GeminiClient>,
    enabled: bool,
    /// Layer 1 → 2 기준 (일)
    layer1_days: i64,
    /// Layer 2 → 3 기준 (일)
    layer2_days: i64,
}

impl MemoryCompressor {
    pub fn new(pool: SqlitePool, llm: Arc<GeminiClient>, enabled: bool) -> Self {
        Self {
            pool,
            llm,
            enabled,
            layer1_days: 7,
            layer2_days: 30,
        }
    }

    /// 3계층 압축 배치 실행.
    pub async fn run_compression(&self) -> CompressionResult {
        if !self.enabled {
            info!("기억 압축 비활성 (MEMORY_COMPRESS_ENABLED=false)");
            return CompressionResult::default();
        }

        let cutoff = |days: i64| {
            (now_kst() - chrono::Duration::days(days))
                .format("%Y-%m-%d")
                .to_string()
        };
        let layer1_cutoff = cutoff(self.layer1_days);
        let layer2_cutoff = cutoff(self.layer2_days);
        let archive_cutoff = cutoff(90);

        info!(
            "기억 압축 시작 — Layer1→2 기준: {} / Layer2→3 기준: {}",
            layer1_cutoff, layer2_cutoff
        );

        let mut result = CompressionResult::default();

        // Step 1: Layer1 → Layer2
        let (compressed, skipped) = self.compress_layer1_to_2(&layer1_cutoff).await;
        result.compressed_l1 = compressed;
        result.skipped = skipped;

        // Step 2: Layer2 → Layer3
        result.compressed_l2 = self.compress_layer2_to_3(&layer2_cutoff).await;

        // Step 3: 90일+ 최종 정리
        result.cleaned = JournalRepository::clean_old_layer3(&self.pool, &archive_cutoff)
            .await
            .unwrap_or(0);

        // Step 4: KOSPI 레벨별 승률 통계
        let (buckets, trades) = self.update_index_stats().await;
        result.index_buckets_updated = buckets;
        result.index_trades_analyzed = trades;

        info!(
            "기억 압축 완료 — Layer1→2: {}건 / Layer2→3: {}건 / 정리: {}건 / 규칙요약 대체: {}건",
            result.compressed_l1, result.compressed_l2, result.cleaned, result.skipped
        );
        result
    }

    async fn compress_layer1_to_2(&self, cutoff_date: &str) -> (usize, usize) {
        let rows = match JournalRepository::rows_older_than(&self.pool, 1, cutoff_date).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Layer1 조회 실패: {}", e);
                return (0, 0);
            }
        };
        if rows.is_empty() {
            info!("Layer1→2 압축 대상 없음");
            return (0, 0);
        }

        let mut compressed = 0;
        let mut skipped = 0;
        let now = now_kst_iso();

        for row in rows {
            let mut summary = self.ai_summarize(&row).await;
            if summary.is_empty() {
                summary = rule_based_summary(&row);
                if !self.llm.is_enabled() {
                    skipped += 1;
                }
            }
            if summary.is_empty() {
                continue;
            }

            match JournalRepository::promote_to_layer2(&self.pool, row.id, &summary, &now).await {
                Ok(()) => compressed += 1,
                Err(e) => warn!("Layer1→2 UPDATE 실패 (id={}): {}", row.id, e),
            }
        }

        info!("Layer1→2 압축 완료: {}건 / 규칙요약: {}건", compressed, skipped);
        (compressed, skipped)
    }

    async fn compress_layer2_to_3(&self, cutoff_date: &str) -> usize {
        let rows = match JournalRepository::rows_older_than(&self.pool, 2, cutoff_date).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Layer2 조회 실패: {}", e);
                return 0;
            }
        };
        if rows.is_empty() {
            return 0;
        }

        let mut compressed = 0;
        let now = now_kst_iso();

        for row in rows {
            // 가장 짧은 핵심 텍스트만 유지 (50자)
            let core = row
                .one_line_summary
                .clone()
                .filter(|s| !s.is_empty())
                .or_else(|| row.summary_text.clone())
                .unwrap_or_default();
            let core_short: String = core.chars().take(50).collect();

            match JournalRepository::promote_to_layer3(&self.pool, row.id, &core_short, &now).await
            {
                Ok(()) => compressed += 1,
                Err(e) => warn!("Layer2→3 UPDATE 실패 (id={}): {}", row.id, e),
            }
        }

        info!("Layer2→3 압축 완료: {}건", compressed);
        compressed
    }

    /// AI 요약 (80자 이내). 실패·비활성은 빈 문자열.
    async fn ai_summarize(&self, row: &CompressionRow) -> String {
        if !self.llm.is_enabled() {
            return String::new();
        }

        let prompt = format!(
            r#"다음 거래 복기를 80자 이내 한 문장으로 압축 요약하세요. 핵심 교훈 중심. 설명 없이 요약만:

종목: {}({}) 수익률: {:+.1}% 청산: {}
상황분석: {}
판단평가: {}
교훈: {}
한줄요약: {}

요약:"#,
            row.name.as_deref().unwrap_or(""),
            row.ticker.as_deref().unwrap_or(""),
            row.profit_rate.unwrap_or(0.0),
            row.close_reason.as_deref().unwrap_or(""),
            row.situation_analysis.as_deref().unwrap_or("{}"),
            row.judgment_evaluation.as_deref().unwrap_or("{}"),
            row.lessons.as_deref().unwrap_or("[]"),
            row.one_line_summary.as_deref().unwrap_or(""),
        );

        match self.llm.generate(&prompt, 100).await {
            Ok(raw) => {
                let cleaned = raw
                    .trim()
                    .trim_start_matches("요약:")
                    .trim_start_matches("Summary:")
                    .trim();
                cleaned.chars().take(100).collect()
            }
            Err(e) => {
                debug!("AI 요약 실패 ({:?}): {}", row.ticker, e);
                String::new()
            }
        }
    }

    /// KOSPI 레벨별 매매 승률 통계 집계 → kospi_index_stats UPSERT.
    pub async fn update_index_stats(&self) -> (usize, usize) {
        let rows = match IndexStatsRepository::closed_trades_with_context(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("kospi_index_stats 조회 실패: {}", e);
                return (0, 0);
            }
        };
        if rows.is_empty() {
            info!("kospi_index_stats: 분석 가능한 거래 없음");
            return (0, 0);
        }

        struct Bucket {
            level: i64,
            wins: i64,
            total: i64,
            profits: Vec<f64>,
        }

        let mut buckets: HashMap<String, Bucket> = HashMap::new();
        let mut analyzed = 0;

        for row in &rows {
            let Some(level) = row
                .buy_market_context
                .as_deref()
                .and_then(extract_kospi_level)
            else {
                continue;
            };

            let bucket_low = level / KOSPI_BUCKET_SIZE * KOSPI_BUCKET_SIZE;
            let range = format!("{}~{}", bucket_low, bucket_low + KOSPI_BUCKET_SIZE);

            let bucket = buckets.entry(range).or_insert(Bucket {
                level: bucket_low + KOSPI_BUCKET_SIZE / 2,
                wins: 0,
                total: 0,
                profits: Vec::new(),
            });
            bucket.total += 1;
            if let Some(rate) = row.profit_rate {
                if rate > 0.0 {
                    bucket.wins += 1;
                }
                bucket.profits.push(rate);
            }
            analyzed += 1;
        }

        let now = now_kst_iso();
        let today = now_kst().format("%Y-%m-%d").to_string();
        let mut updated = 0;

        for (range, bucket) in &buckets {
            let win_rate = if bucket.total > 0 {
                (bucket.wins as f64 / bucket.total as f64 * 1000.0).round() / 10.0
            } else {
                0.0
            };
            let avg_profit = if bucket.profits.is_empty() {
                0.0
            } else {
                let sum: f64 = bucket.profits.iter().sum();
                (sum / bucket.profits.len() as f64 * 100.0).round() / 100.0
            };

            match IndexStatsRepository::upsert_bucket(
                &self.pool,
                &today,
                bucket.level,
                range,
                bucket.wins,
                bucket.total,
                win_rate,
                avg_profit,
                &now,
            )
            .await
            {
                Ok(()) => updated += 1,
                Err(e) => warn!("kospi_index_stats UPSERT 실패 ({}): {}", range, e),
            }
        }

        info!(
            "KOSPI 지수 레벨 통계 업데이트 완료 — {}개 구간 / {}건 분석",
            updated, analyzed
        );
        (updated, analyzed)
    }
}

/// 매수 컨텍스트 문자열에서 KOSPI 레벨 추출.
///
/// "강세장 KOSPI2547" → 2547. KOSPI 표기가 없으면 500~10000 범위의
/// 4~5자리 숫자를 찾는다.
fn extract_kospi_level(context: &str) -> Option<i64> {
    let upper = context.to_uppercase();
    if let Some(pos) = upper.find("KOSPI") {
        let tail = &context[pos + 5..];
        let tail = tail.trim_start_matches([':', '=', ' ']);
        let digits: String = tail
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if let Ok(value) = digits.split('.').next().unwrap_or("").parse::<i64>() {
            if value > 0 {
                return Some(value);
            }
        }
    }

    // fallback: 독립된 4~5자리 숫자
    let mut current = String::new();
    for c in context.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() {
            current.push(c);
        } else {
            if (4..=5).contains(&current.len()) {
                if let Ok(value) = current.parse::<i64>() {
                    if (500..=10_000).contains(&value) {
                        return Some(value);
                    }
                }
            }
            current.clear();
        }
    }
    None
}

/// AI 없을 때 규칙 기반 요약.
fn rule_based_summary(row: &CompressionRow) -> String {
    if let Some(summary) = &row.one_line_summary {
        if !summary.is_empty() {
            return summary.chars().take(80).collect();
        }
    }

    let reason_kr = row
        .close_reason
        .as_deref()
        .and_then(CloseReason::parse)
        .map(|r| r.label_kr().to_string())
        .unwrap_or_else(|| row.close_reason.clone().unwrap_or_else(|| "청산".to_string()));

    let lesson_short = row
        .lessons
        .as_deref()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
        .and_then(|v| {
            v.get(0)
                .and_then(|l| l.get("action"))
                .and_then(|a| a.as_str())
                .map(|s| s.chars().take(30).collect::<String>())
        })
        .unwrap_or_default();

    let base = format!("{:+.1}% {}", row.profit_rate.unwrap_or(0.0), reason_kr);
    if lesson_short.is_empty() {
        base
    } else {
        format!("{} | {}", base, lesson_short)
    }
}
