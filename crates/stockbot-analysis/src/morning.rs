//! 아침봇 3단계 파이프라인.
//!
//! ① `analyze_market_env` — 미국 섹터ETF(±2%+) + 원자재 + 환율 → 시장환경
//! ② `analyze_materials` — 공시·뉴스·가격 + ①결과 → 후보 ≤20 (cap_tier 주입)
//! ③ `pick_final` — 후보 + 자금집중·공매도 + RAG 과거패턴 → 최종 픽 ≤15
//!
//! 각 단계는 parse-or-default다: JSON 파싱 실패·모델 소진은 해당 단계의
//! 중립 기본값으로 degrade하고 호출자에게 에러를 올리지 않는다.
//! ③ 완료 직후 daily_picks를 날짜별 삭제 후 재삽입한다 (08:30 재실행 대비).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use stockbot_collector::{flatten_news, DailyCache};
use stockbot_core::{today_kst, CapTier, Pick, RiskRegime};
use stockbot_data::picks::PickRepository;
use stockbot_data::rag::RagRepository;

use crate::llm::{extract_json, GeminiClient};

/// ① 시장환경 판단 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEnvAnalysis {
    #[serde(rename = "환경", default)]
    pub regime: RiskRegime,
    #[serde(rename = "주도테마후보", default)]
    pub leading_themes: Vec<String>,
    #[serde(rename = "한국시장영향", default)]
    pub korean_market_impact: String,
}

impl Default for MarketEnvAnalysis {
    fn default() -> Self {
        Self {
            regime: RiskRegime::Neutral,
            leading_themes: Vec::new(),
            korean_market_impact: "데이터 부족".to_string(),
        }
    }
}

/// ② 후보 1종목.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "종목명", default)]
    pub name: String,
    #[serde(rename = "종목코드", default)]
    pub code: String,
    #[serde(rename = "근거", default)]
    pub reason: String,
    /// 재료강도: 상 / 중 / 하
    #[serde(rename = "재료강도", default)]
    pub strength: String,
    #[serde(rename = "유형", default)]
    pub category: stockbot_core::PickCategory,
    /// 후처리 주입 (LLM 스키마에 없음)
    #[serde(default)]
    pub cap_tier: CapTier,
}

/// ② 재료 검증 결과.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateSet {
    #[serde(rename = "후보종목", default)]
    pub candidates: Vec<Candidate>,
    #[serde(rename = "제외근거", default)]
    pub exclusion_rationale: String,
}

/// ③ 최종 픽 래퍼.
#[derive(Debug, Clone, Default, Deserialize)]
struct FinalPicks {
    #[serde(default)]
    picks: Vec<Pick>,
}

/// 파이프라인 전체 결과.
#[derive(Debug, Clone, Default)]
pub struct MorningResult {
    pub market_env: MarketEnvAnalysis,
    pub candidates: CandidateSet,
    pub picks: Vec<Pick>,
}

/// 아침봇 파이프라인.
pub struct MorningPipeline {
    llm: Arc<GeminiClient>,
    pool: SqlitePool,
}

impl MorningPipeline {
    pub fn new(llm: Arc<GeminiClient>, pool: SqlitePool) -> Self {
        Self { llm, pool }
    }

    /// 전체 3단계 실행. 어떤 단계가 실패해도 에러를 올리지 않는다.
    pub async fn analyze(&self, cache: &DailyCache) -> MorningResult {
        let mut result = MorningResult::default();

        if !self.llm.is_enabled() {
            error!("AI 클라이언트 없음 — 아침 분석 중단");
            return result;
        }

        // ── ① 시장환경 ──────────────────────────────────────
        result.market_env = self.analyze_market_env(cache).await;
        info!(
            "①시장환경: {} / 테마후보: {:?}",
            result.market_env.regime, result.market_env.leading_themes
        );

        // ── ② 재료 검증 + 후보 압축 ─────────────────────────
        result.candidates = self.analyze_materials(cache, &result.market_env).await;
        info!("②후보종목 {}개 선별 완료", result.candidates.candidates.len());

        // ── ③ 최종 픽 (RAG 포함) ────────────────────────────
        result.picks = self.pick_final(cache, &result.candidates).await;
        info!("③최종 픽 {}종목 완료", result.picks.len());

        result
    }

    /// ① 시장환경 판단. 실패 시 중립 기본값.
    pub async fn analyze_market_env(&self, cache: &DailyCache) -> MarketEnvAnalysis {
        let us_sectors = serde_json::to_string(&cache.market_data.us_market.sectors)
            .unwrap_or_else(|_| "{}".to_string());
        let commodities = serde_json::to_string(&cache.market_data.commodities)
            .unwrap_or_else(|_| "{}".to_string());
        let forex =
            serde_json::to_string(&cache.market_data.forex).unwrap_or_else(|_| "{}".to_string());

        let prompt = format!(
            r#"오늘 한국 주식시장 환경을 판단해라.

[미국 섹터 ETF 등락 (±2%+ 필터 적용, 없으면 빈 목록)]
{us_sectors}

[원자재]
{commodities}

[환율]
{forex}

판단 규칙:
- 기술/반도체 ETF +2%+ → 리스크온 + 반도체 테마 가중
- 에너지 ETF +2%+ → 정유/에너지 테마
- 국채금리 급등 → 리스크오프
- 달러 강세(원화 약세) → 수출주 유리
- 원자재 급등(원유/구리) → 관련 소재/에너지 테마

다음을 JSON으로만 반환 (다른 텍스트 없음):
{{
  "환경": "리스크온" | "리스크오프" | "중립",
  "주도테마후보": ["테마명1", "테마명2"],
  "한국시장영향": "한 문장 요약 (50자 이내)"
}}"#
        );

        match self.call_and_parse::<MarketEnvAnalysis>(&prompt, 1_500).await {
            Some(env) => env,
            None => {
                warn!("①시장환경 JSON 파싱 실패 — 중립 기본값 사용");
                MarketEnvAnalysis::default()
            }
        }
    }

    /// ② 재료 검증 + 후보 압축. 실패 시 빈 후보.
    pub async fn analyze_materials(
        &self,
        cache: &DailyCache,
        market_env: &MarketEnvAnalysis,
    ) -> CandidateSet {
        let filings: Vec<_> = cache.dart_data.iter().take(20).collect();
        let (upper_limit, top_gainers) = match &cache.price_data {
            Some(p) => (
                p.upper_limit.iter().take(15).collect::<Vec<_>>(),
                p.top_gainers.iter().take(15).collect::<Vec<_>>(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        let news_naver: Vec<_> = flatten_news(&cache.news_naver).into_iter().take(15).collect();
        let news_api: Vec<_> = flatten_news(&cache.news_newsapi).into_iter().take(10).collect();

        let prompt = format!(
            r#"목표: 오늘 한국 주식 중 당일 20% 이상 또는 상한가 달성 가능한 종목 발굴.

[시장환경 — 호출① 결과]
{market_env}

[DART 공시 (본문 포함, 최대 20건)]
{filings}

[전날 상한가 종목 (시총 3000억 이하)]
{upper_limit}

[전날 15%+ 급등 종목 (시총 3000억 이하)]
{top_gainers}

[주요 뉴스 — 네이버 (최대 15건)]
{news_naver}

[주요 뉴스 — NewsAPI (최대 10건)]
{news_api}

판단 기준:
- 소형주(시총 3000억 이하) 우선: 20%+ 달성 확률 높음
- DART 공시: 자기자본대비 비율, 실적 영향 직접 계산 → 재료강도 판단
  예) 자기자본대비 20%+ 수주 → 강재료(상), 10~20% → 중재료, 10% 미만 → 하재료
- 순환매: 전날 대장주 상한가 → 오늘 같은 테마 2등주 흐름
- 테마: 호출① 주도테마후보와 연결된 종목 우선
- 숏스퀴즈: 공매도 잔고 높은데 호재 발생

다음을 JSON으로만 반환 (다른 텍스트 없음):
{{
  "후보종목": [
    {{
      "종목명":   "종목명",
      "종목코드": "6자리코드 또는 빈문자열",
      "근거":     "구체적 근거 (50자 이내)",
      "재료강도": "상" | "중" | "하",
      "유형":     "공시" | "테마" | "순환매" | "숏스퀴즈"
    }}
  ],
  "제외근거": "제외된 종목 패턴 요약 (30자 이내)"
}}
최대 20종목. 재료강도 "상" 우선 정렬."#,
            market_env = json_or_empty(market_env),
            filings = json_or_empty(&filings),
            upper_limit = json_or_empty(&upper_limit),
            top_gainers = json_or_empty(&top_gainers),
            news_naver = json_or_empty(&news_naver),
            news_api = json_or_empty(&news_api),
        );

        let mut set = match self.call_and_parse::<CandidateSet>(&prompt, 1_500).await {
            Some(set) => set,
            None => {
                warn!("②재료검증 JSON 파싱 실패");
                return CandidateSet {
                    candidates: Vec::new(),
                    exclusion_rationale: "파싱 실패".to_string(),
                };
            }
        };

        // cap_tier 주입 (price_data 시가총액 기반)
        if let Some(price_data) = &cache.price_data {
            for candidate in &mut set.candidates {
                let cap = price_data.market_cap_of(&candidate.code, &candidate.name);
                candidate.cap_tier = CapTier::from_market_cap(cap);
            }
        }

        set.candidates.truncate(20);
        set
    }

    /// ③ 최종 픽 선정 (RAG 보강). 실패 시 빈 픽.
    pub async fn pick_final(&self, cache: &DailyCache, candidates: &CandidateSet) -> Vec<Pick> {
        let rag_context = self.build_rag_context(&candidates.candidates).await;

        let fund_top: Vec<_> = cache.fund_concentration_result.iter().take(20).collect();
        let short_top: Vec<_> = cache.short_data.iter().take(20).collect();

        let prompt = format!(
            r#"한국 주식 모닝봇 최종 픽 선정 전문가.
목표: 당일 20%+ 또는 상한가 달성 가능한 최상위 종목 15개 선정.

[후보종목 — 호출② 결과 (최대 20종목)]
{candidates}

[자금집중 상위 20종목 (거래대금/시총 비율 높은 순)]
{fund_top}

[공매도 잔고 상위 20종목]
{short_top}

[RAG: 과거 유사패턴 및 실제 결과]
{rag}

최종 선정 기준 (우선순위):
1. 재료강도 "상" + 자금집중 겹치는 종목 최우선
2. RAG에서 같은 신호유형 20%+ 성공률 높은 패턴 우대
3. 공매도 잔고 높은 종목에 호재 → 숏스퀴즈 가능성 추가 고려
4. 테마 종목은 같은 테마 내 2~3종목 이내로 분산
5. 재료 없는 단순 거래량 급증 → 낮은 순위

다음을 JSON으로만 반환 (다른 텍스트 없음):
{{
  "picks": [
    {{
      "순위":       1,
      "종목명":     "종목명",
      "종목코드":   "6자리코드 또는 빈문자열",
      "근거":       "구체적 근거 (60자 이내)",
      "유형":       "공시" | "테마" | "순환매" | "숏스퀴즈",
      "목표등락률": "20%" | "상한가",
      "손절기준":   "손절 조건 (30자 이내)",
      "테마여부":   true | false,
      "매수시점":   "매수 타이밍 (20자 이내)"
    }}
  ]
}}
1위부터 매수 우선순위 순. 최대 15종목."#,
            candidates = json_or_empty(&candidates.candidates),
            fund_top = json_or_empty(&fund_top),
            short_top = json_or_empty(&short_top),
            rag = if rag_context.is_empty() {
                "아직 축적된 패턴 데이터 없음"
            } else {
                rag_context.as_str()
            },
        );

        let parsed = match self.call_and_parse::<FinalPicks>(&prompt, 2_500).await {
            Some(p) => p,
            None => {
                warn!("③최종픽 JSON 파싱 실패");
                return Vec::new();
            }
        };

        let mut picks = parsed.picks;
        picks.truncate(15);

        // cap_tier 역매핑 — LLM 출력 스키마에 없으므로 후보에서 주입
        let name_map: HashMap<&str, CapTier> = candidates
            .candidates
            .iter()
            .map(|c| (c.name.as_str(), c.cap_tier))
            .collect();
        let code_map: HashMap<&str, CapTier> = candidates
            .candidates
            .iter()
            .filter(|c| !c.code.is_empty())
            .map(|c| (c.code.as_str(), c.cap_tier))
            .collect();

        for (i, pick) in picks.iter_mut().enumerate() {
            pick.cap_tier = name_map
                .get(pick.stock_name.as_str())
                .or_else(|| code_map.get(pick.stock_code.as_str()))
                .copied()
                .unwrap_or(CapTier::Unclassified);
            // 순위 정규화
            if pick.rank == 0 {
                pick.rank = (i + 1) as u32;
            }
        }

        // daily_picks 저장 (삭제 후 재삽입) — 실패는 비치명적
        let today = today_kst().format("%Y%m%d").to_string();
        if let Err(e) = PickRepository::replace_for_date(&self.pool, &today, &picks).await {
            warn!("daily_picks 저장 실패 (비치명적): {}", e);
        }

        picks
    }

    /// 후보 목록의 고유 (signal_type, cap_tier) 조합별 RAG 블록 수집.
    async fn build_rag_context(&self, candidates: &[Candidate]) -> String {
        if candidates.is_empty() {
            return String::new();
        }

        let mut seen = HashSet::new();
        let mut blocks = Vec::new();

        for candidate in candidates {
            let signal_type = candidate.category.signal_type();
            let key = (signal_type, candidate.cap_tier);
            if !seen.insert(key) {
                continue;
            }

            match RagRepository::similar_patterns_block(
                &self.pool,
                signal_type,
                candidate.cap_tier,
                5,
            )
            .await
            {
                Ok(block) if !block.is_empty() => blocks.push(block),
                Ok(_) => {}
                Err(e) => warn!("RAG 유사패턴 검색 실패: {}", e),
            }
        }

        blocks.join("\n\n")
    }

    /// 호출 + 관대한 JSON 파싱. 어느 단계든 실패는 None.
    async fn call_and_parse<T: serde::de::DeserializeOwned>(
        &self,
        prompt: &str,
        max_tokens: u32,
    ) -> Option<T> {
        let raw = match self.llm.generate(prompt, max_tokens).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("AI 호출 실패: {}", e);
                return None;
            }
        };

        let value = match extract_json(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("JSON 추출 실패: {}", e);
                return None;
            }
        };

        serde_json::from_value(value).ok()
    }
}

/// 직렬화 실패를 빈 JSON으로 degrade.
fn json_or_empty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use stockbot_collector::{PriceData, PriceRow};
    use stockbot_core::PickCategory;
    use stockbot_data::store;

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = store::open_pool(path.to_str().unwrap()).await.unwrap();
        store::init_db(&pool).await.unwrap();
        (dir, pool)
    }

    fn gemini_mock(server: &mockito::Server) -> Arc<GeminiClient> {
        Arc::new(
            GeminiClient::new(Some(SecretString::from("key".to_string())))
                .with_base_url(server.url())
                .with_models(vec!["test-model".to_string()]),
        )
    }

    fn llm_body(text: &str) -> String {
        serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_stage1_parse_failure_returns_neutral() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", mockito::Matcher::Regex(".*generateContent.*".to_string()))
            .with_status(200)
            .with_body(llm_body("JSON이 아닌 답변"))
            .create_async()
            .await;

        let (_dir, pool) = test_pool().await;
        let pipeline = MorningPipeline::new(gemini_mock(&server), pool);

        let env = pipeline.analyze_market_env(&DailyCache::default()).await;
        assert_eq!(env.regime, RiskRegime::Neutral);
        assert_eq!(env.korean_market_impact, "데이터 부족");
    }

    #[tokio::test]
    async fn test_stage2_injects_cap_tier() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", mockito::Matcher::Regex(".*generateContent.*".to_string()))
            .with_status(200)
            .with_body(llm_body(
                r#"{"후보종목": [{"종목명": "소형주", "종목코드": "000001",
                    "근거": "수주", "재료강도": "상", "유형": "공시"}],
                    "제외근거": "재료 약함"}"#,
            ))
            .create_async()
            .await;

        let (_dir, pool) = test_pool().await;
        let pipeline = MorningPipeline::new(gemini_mock(&server), pool);

        let mut cache = DailyCache::default();
        let mut price = PriceData::default();
        price.by_code.insert(
            "000001".to_string(),
            PriceRow {
                market_cap: 25_000_000_000, // 300억 미만
                ..Default::default()
            },
        );
        cache.price_data = Some(price);

        let set = pipeline
            .analyze_materials(&cache, &MarketEnvAnalysis::default())
            .await;
        assert_eq!(set.candidates.len(), 1);
        assert_eq!(set.candidates[0].cap_tier, CapTier::Small300);
        assert_eq!(set.candidates[0].category, PickCategory::Filing);
    }

    #[tokio::test]
    async fn test_stage3_truncates_backfills_and_persists() {
        let mut server = mockito::Server::new_async().await;
        // 16종목 반환 → 15로 잘린다
        let picks_json: Vec<String> = (1..=16)
            .map(|i| {
                format!(
                    r#"{{"순위": {i}, "종목명": "종목{i}", "종목코드": "{:06}",
                        "근거": "근거", "유형": "공시", "목표등락률": "20%",
                        "손절기준": "-5%", "테마여부": false, "매수시점": "시초가"}}"#,
                    i
                )
            })
            .collect();
        server
            .mock("POST", mockito::Matcher::Regex(".*generateContent.*".to_string()))
            .with_status(200)
            .with_body(llm_body(&format!(r#"{{"picks": [{}]}}"#, picks_json.join(","))))
            .create_async()
            .await;

        let (_dir, pool) = test_pool().await;
        let pipeline = MorningPipeline::new(gemini_mock(&server), pool.clone());

        let candidates = CandidateSet {
            candidates: vec![Candidate {
                name: "종목1".to_string(),
                code: "000001".to_string(),
                reason: "수주".to_string(),
                strength: "상".to_string(),
                category: PickCategory::Filing,
                cap_tier: CapTier::Small1000,
            }],
            exclusion_rationale: String::new(),
        };

        let picks = pipeline.pick_final(&DailyCache::default(), &candidates).await;
        assert_eq!(picks.len(), 15);
        // 후보에 있던 종목1은 cap_tier 역매핑
        assert_eq!(picks[0].cap_tier, CapTier::Small1000);
        // 후보에 없던 종목은 미분류
        assert_eq!(picks[1].cap_tier, CapTier::Unclassified);

        // daily_picks 저장 확인 — 정규화된 신호 유형으로
        let today = today_kst().format("%Y%m%d").to_string();
        let stored = PickRepository::load_for_date(&pool, &today).await.unwrap();
        assert_eq!(stored.len(), 15);
        assert_eq!(stored[0].signal_type, "DART_공시");
    }

    #[tokio::test]
    async fn test_disabled_llm_yields_empty_result() {
        let (_dir, pool) = test_pool().await;
        let pipeline = MorningPipeline::new(Arc::new(GeminiClient::new(None)), pool);
        let result = pipeline.analyze(&DailyCache::default()).await;
        assert!(result.picks.is_empty());
        assert!(result.candidates.candidates.is_empty());
        assert_eq!(result.market_env.regime, RiskRegime::Neutral);
    }
}
