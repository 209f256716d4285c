//! 매매 일지 기록기.
//!
//! 청산 직후 동기 흐름으로 호출된다:
//! ① 규칙 기반 패턴 태그 (AI 없이 항상 동작)
//! ② 선택적 AI 회고 (상황분석/판단평가/교훈/추가태그/한줄요약)
//! ③ 태그 병합 (중복 제거, 순서 보존) 후 INSERT
//! ④ AI 교훈이 있으면 기존 원칙의 카운트만 보강 (INSERT는 주간 배치 몫)

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use stockbot_analysis::llm::{extract_json, GeminiClient};
use stockbot_core::{now_kst_iso, ClosedTrade};
use stockbot_data::journal::{JournalRepository, NewJournalEntry, PatternAggRow};
use stockbot_data::principles::PrincipleRepository;
use stockbot_execution::TradeJournalHook;

/// 태그별 주간 패턴 통계.
#[derive(Debug, Clone)]
pub struct PatternStat {
    pub tag: String,
    pub count: i64,
    pub win_count: i64,
    pub win_rate: f64,
    pub avg_profit: f64,
    pub lesson_sample: Option<String>,
}

/// AI 회고 응답.
#[derive(Debug, Clone, Default, Deserialize)]
struct Retrospective {
    #[serde(default)]
    situation_analysis: serde_json::Value,
    #[serde(default)]
    judgment_evaluation: serde_json::Value,
    #[serde(default)]
    lessons: Vec<Lesson>,
    #[serde(default)]
    extra_tags: Vec<String>,
    #[serde(default)]
    one_line_summary: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Lesson {
    #[serde(default)]
    condition: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    #[allow(dead_code)]
    priority: String,
}

/// 일지 기록기.
pub struct JournalRecorder {
    pool: SqlitePool,
    llm: Arc<GeminiClient>,
}

impl JournalRecorder {
    pub fn new(pool: SqlitePool, llm: Arc<GeminiClient>) -> Self {
        Self { pool, llm }
    }

    /// 거래 1건 일지 기록. 실패는 비치명적 (false 반환).
    pub async fn record(&self, trade: &ClosedTrade) -> bool {
        let rule_tags = extract_rule_tags(
            trade.profit_rate,
            &trade.trigger_source,
            trade.close_reason.as_str(),
            &trade.market_env,
        );

        let retro = self.ai_retrospective(trade).await.unwrap_or_default();

        // rule-based + AI 태그 병합 (중복 제거, 순서 보존)
        let mut merged_tags = rule_tags;
        for tag in &retro.extra_tags {
            if !merged_tags.contains(tag) {
                merged_tags.push(tag.clone());
            }
        }

        let entry = NewJournalEntry {
            trading_id: trade.trading_id,
            ticker: trade.ticker.clone(),
            name: trade.name.clone(),
            buy_time: trade.buy_time.clone(),
            sell_time: trade.sell_time.clone(),
            buy_price: trade.buy_price,
            sell_price: trade.sell_price,
            profit_rate: trade.profit_rate,
            trigger_source: trade.trigger_source.clone(),
            close_reason: trade.close_reason.as_str().to_string(),
            market_env: trade.market_env.clone(),
            situation_analysis: retro.situation_analysis.to_string(),
            judgment_evaluation: retro.judgment_evaluation.to_string(),
            lessons: serde_json::to_string(
                &retro
                    .lessons
                    .iter()
                    .map(|l| json!({"condition": l.condition, "action": l.action}))
                    .collect::<Vec<_>>(),
            )
            .unwrap_or_else(|_| "[]".to_string()),
            pattern_tags: serde_json::to_string(&merged_tags)
                .unwrap_or_else(|_| "[]".to_string()),
            one_line_summary: retro.one_line_summary.chars().take(50).collect(),
            created_at: now_kst_iso(),
        };

        match JournalRepository::insert(&self.pool, &entry).await {
            Ok(_) => {
                info!(
                    "일지 기록 완료 — {}({}) 수익률 {:+.2}% 태그: {:?}",
                    trade.name, trade.ticker, trade.profit_rate, merged_tags
                );
                if !retro.lessons.is_empty() {
                    self.push_lessons_to_principles(&retro.lessons, &trade.trigger_source)
                        .await;
                }
                true
            }
            Err(e) => {
                warn!("일지 기록 실패 ({}): {}", trade.ticker, e);
                false
            }
        }
    }

    /// AI 회고 분석. 클라이언트 없음·실패는 None (규칙 태그만으로 진행).
    async fn ai_retrospective(&self, trade: &ClosedTrade) -> Option<Retrospective> {
        if !self.llm.is_enabled() {
            return None;
        }

        let prompt = format!(
            r#"당신은 노련한 한국 주식 단타 매매 전문가입니다.
다음 완료된 거래를 복기(회고)하고 JSON으로만 응답하세요. 설명 없이 JSON만.

[거래 정보]
종목명: {name} ({ticker})
매수가: {buy_price}원  |  매도가: {sell_price}원
수익률: {profit_rate:+.2}%
매수 시각: {buy_time}  |  매도 시각: {sell_time}
진입 트리거: {trigger}
청산 사유: {reason}
시장 환경: {env}

[분석 지시]
1. 매수/매도 당시 상황 비교 (시장·종목·재료 변화)
2. 매수/매도 판단 품질 평가 (적절/부적절/보통)
3. 실행 가능한 교훈 1~3개 추출
4. 패턴 태그 부여 (아래 목록에서 해당하는 것)

[사용 가능한 추가 패턴 태그]
조기포착, 추격매수, 급등후조정, 박스권돌파, 손절지연, 익절조급,
추세추종, 눌림목매수, 재료과신, 경고무시, 좋은손익비

[응답 형식]
{{
  "situation_analysis": {{
    "buy_context_summary": "매수 당시 상황 요약 (30자 이내)",
    "sell_context_summary": "매도 당시 상황 요약 (30자 이내)",
    "key_changes": ["변화1", "변화2"]
  }},
  "judgment_evaluation": {{
    "buy_quality": "적절/부적절/보통",
    "sell_quality": "적절/조급/지연/보통",
    "missed_signals": ["놓친 신호"]
  }},
  "lessons": [
    {{"condition": "이런 상황에서는", "action": "이렇게 해야 한다", "priority": "high/medium/low"}}
  ],
  "extra_tags": ["추가태그1"],
  "one_line_summary": "한 줄 요약 (25자 이내)"
}}"#,
            name = trade.name,
            ticker = trade.ticker,
            buy_price = trade.buy_price,
            sell_price = trade.sell_price,
            profit_rate = trade.profit_rate,
            buy_time = trade.buy_time,
            sell_time = trade.sell_time,
            trigger = trade.trigger_source,
            reason = trade.close_reason,
            env = if trade.market_env.is_empty() {
                "미지정"
            } else {
                &trade.market_env
            },
        );

        let raw = match self.llm.generate(&prompt, 800).await {
            Ok(r) => r,
            Err(e) => {
                debug!("AI 회고 분석 실패 ({}): {}", trade.ticker, e);
                return None;
            }
        };
        let value = extract_json(&raw).ok()?;
        serde_json::from_value(value).ok()
    }

    /// AI 교훈 → 기존 원칙의 카운트 보강.
    ///
    /// INSERT는 하지 않는다 — 샘플 기준을 지키는 주간 배치의 몫이다.
    async fn push_lessons_to_principles(&self, lessons: &[Lesson], trigger_source: &str) {
        for lesson in lessons {
            if lesson.condition.trim().is_empty() || lesson.action.trim().is_empty() {
                continue;
            }
            let row = match PrincipleRepository::find_by_trigger(&self.pool, trigger_source).await
            {
                Ok(Some(row)) => row,
                Ok(None) => continue,
                Err(e) => {
                    debug!("principles 반영 실패: {}", e);
                    continue;
                }
            };
            let new_total = row.total_count + 1;
            let win_rate = if new_total > 0 {
                (row.win_count as f64 / new_total as f64 * 1000.0).round() / 10.0
            } else {
                0.0
            };
            let _ = PrincipleRepository::update_stats(
                &self.pool,
                row.id,
                row.win_count,
                new_total,
                win_rate,
                row.result_summary.as_deref().unwrap_or(""),
                &row.confidence,
                &now_kst_iso(),
            )
            .await;
        }
    }

    /// 최근 N일 일지에서 패턴 태그 빈도 + 승률 집계.
    pub async fn get_weekly_patterns(&self, days: i64) -> Vec<PatternStat> {
        let since = (stockbot_core::now_kst() - chrono::Duration::days(days))
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
        let rows = match JournalRepository::pattern_rows_since(&self.pool, &since).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("주간 패턴 조회 실패: {}", e);
                return Vec::new();
            }
        };
        aggregate_patterns(&rows)
    }
}

#[async_trait]
impl TradeJournalHook for JournalRecorder {
    async fn on_close(&self, trade: &ClosedTrade) {
        self.record(trade).await;
    }
}

/// 규칙 기반 패턴 태그 추출 — AI 없이도 항상 동작한다.
pub fn extract_rule_tags(
    profit_rate: f64,
    trigger_source: &str,
    close_reason: &str,
    market_env: &str,
) -> Vec<String> {
    let mut tags = Vec::new();

    // 시장 환경
    if market_env.contains("강세장") {
        tags.push("강세장진입".to_string());
    } else if market_env.contains("약세장") || market_env.contains("횡보") {
        tags.push("약세장진입".to_string());
    }

    // 진입 트리거
    match trigger_source {
        "gap_up" => tags.push(
            if profit_rate > 0.0 {
                "갭상승성공"
            } else {
                "갭상승실패"
            }
            .to_string(),
        ),
        "websocket" => tags.push("워치리스트조기".to_string()),
        _ => {}
    }

    // 청산 사유
    match close_reason {
        "take_profit_1" | "take_profit_2" => tags.push("원칙준수익절".to_string()),
        "trailing_stop" => tags.push("트레일링스탑작동".to_string()),
        "stop_loss" => tags.push(
            if profit_rate < -5.0 {
                "손절지연"
            } else {
                "손절실행"
            }
            .to_string(),
        ),
        "force_close" => tags.push("강제청산".to_string()),
        _ => {}
    }

    // 수익률 결과
    if profit_rate >= 8.0 {
        tags.push("큰수익".to_string());
    } else if profit_rate <= -5.0 {
        tags.push("큰손실".to_string());
    }

    tags
}

/// 일지 행 목록 → 태그별 통계 (빈도 내림차순).
pub fn aggregate_patterns(rows: &[PatternAggRow]) -> Vec<PatternStat> {
    use std::collections::HashMap;

    struct Acc {
        count: i64,
        win_count: i64,
        profits: Vec<f64>,
        lessons: Vec<String>,
    }

    let mut stats: HashMap<String, Acc> = HashMap::new();

    for row in rows {
        let tags: Vec<String> = row
            .pattern_tags
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();

        let lesson_sample = row
            .lessons
            .as_deref()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .and_then(|v| {
                v.get(0)
                    .and_then(|l| l.get("action"))
                    .and_then(|a| a.as_str())
                    .map(|s| s.to_string())
            });

        for tag in tags {
            let acc = stats.entry(tag).or_insert(Acc {
                count: 0,
                win_count: 0,
                profits: Vec::new(),
                lessons: Vec::new(),
            });
            acc.count += 1;
            if let Some(rate) = row.profit_rate {
                if rate > 0.0 {
                    acc.win_count += 1;
                }
                acc.profits.push(rate);
            }
            if let Some(lesson) = &lesson_sample {
                acc.lessons.push(lesson.clone());
            }
        }
    }

    let mut result: Vec<PatternStat> = stats
        .into_iter()
        .map(|(tag, acc)| PatternStat {
            win_rate: if acc.count > 0 {
                (acc.win_count as f64 / acc.count as f64 * 1000.0).round() / 10.0
            } else {
                0.0
            },
            avg_profit: if acc.profits.is_empty() {
                0.0
            } else {
                let sum: f64 = acc.profits.iter().sum();
                (sum / acc.profits.len() as f64 * 100.0).round() / 100.0
            },
            lesson_sample: acc.lessons.last().cloned(),
            count: acc.count,
            win_count: acc.win_count,
            tag,
        })
        .collect();

    result.sort_by(|a, b| b.count.cmp(&a.count));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbot_core::CloseReason;
    use stockbot_data::store;

    #[test]
    fn test_rule_tags() {
        let tags = extract_rule_tags(6.0, "rate", "take_profit_1", "강세장 KOSPI2547");
        assert_eq!(tags, vec!["강세장진입", "원칙준수익절"]);

        let tags = extract_rule_tags(-6.5, "gap_up", "stop_loss", "약세장/횡보");
        assert_eq!(tags, vec!["약세장진입", "갭상승실패", "손절지연", "큰손실"]);

        let tags = extract_rule_tags(9.0, "websocket", "trailing_stop", "");
        assert_eq!(tags, vec!["워치리스트조기", "트레일링스탑작동", "큰수익"]);

        let tags = extract_rule_tags(0.5, "volume", "force_close", "횡보");
        assert_eq!(tags, vec!["약세장진입", "강제청산"]);
    }

    #[test]
    fn test_aggregate_patterns() {
        let rows = vec![
            PatternAggRow {
                pattern_tags: Some(r#"["원칙준수익절","큰수익"]"#.to_string()),
                profit_rate: Some(8.5),
                lessons: Some(r#"[{"condition":"c","action":"눌림목 대기"}]"#.to_string()),
            },
            PatternAggRow {
                pattern_tags: Some(r#"["원칙준수익절"]"#.to_string()),
                profit_rate: Some(-1.0),
                lessons: None,
            },
        ];

        let stats = aggregate_patterns(&rows);
        assert_eq!(stats[0].tag, "원칙준수익절");
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].win_count, 1);
        assert_eq!(stats[0].win_rate, 50.0);
        assert_eq!(stats[0].avg_profit, 3.75);
    }

    #[tokio::test]
    async fn test_record_without_llm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = store::open_pool(path.to_str().unwrap()).await.unwrap();
        store::init_db(&pool).await.unwrap();

        let recorder = JournalRecorder::new(
            pool.clone(),
            Arc::new(GeminiClient::new(None)),
        );

        let trade = ClosedTrade {
            trading_id: 1,
            ticker: "005930".to_string(),
            name: "삼성전자".to_string(),
            buy_time: "2026-08-03T09:30:00+09:00".to_string(),
            sell_time: "2026-08-03T10:30:00+09:00".to_string(),
            buy_price: 10_000,
            sell_price: 10_500,
            qty: 10,
            profit_rate: 5.0,
            profit_amount: 5_000,
            trigger_source: "watchlist".to_string(),
            close_reason: CloseReason::TakeProfit1,
            mode: "VTS".to_string(),
            market_env: "강세장".to_string(),
        };

        assert!(recorder.record(&trade).await);

        let (tags,): (String,) =
            sqlx::query_as("SELECT pattern_tags FROM trading_journal WHERE ticker = '005930'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(tags.contains("원칙준수익절"));
        assert!(tags.contains("강세장진입"));
    }
}
