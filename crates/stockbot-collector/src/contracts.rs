//! 수집기 출력 계약.
//!
//! 구체 수집기(DART·RSS·뉴스 검색·시세·섹터 ETF·공매도·이벤트 캘린더·
//! 마감강도·거래량급증·자금집중)는 외부 협력자다 — 여기서는 출력 타입과
//! [`CollectorSuite`] 인터페이스만 정의한다.
//!
//! 한국어 serde rename은 LLM 프롬프트 직렬화 계약이다 (아침봇이 이 타입을
//! 그대로 JSON으로 넣는다).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stockbot_core::BotResult;

/// DART 공시 1건 (본문요약 포함).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilingRecord {
    #[serde(rename = "종목명", default)]
    pub name: String,
    #[serde(rename = "종목코드", default)]
    pub code: String,
    #[serde(rename = "공시종류", default)]
    pub kind: String,
    #[serde(rename = "규모", default)]
    pub size: String,
    #[serde(rename = "본문요약", default)]
    pub summary: String,
    #[serde(rename = "시가총액", default)]
    pub market_cap: i64,
}

/// 미국 섹터 ETF 등락 (±2%+ 필터 적용 후 남은 것만).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectorMove {
    #[serde(default)]
    pub change: String,
}

/// 미국 증시 스냅샷.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsMarket {
    #[serde(default)]
    pub sectors: HashMap<String, SectorMove>,
    #[serde(default)]
    pub summary: String,
}

/// 글로벌 시장 데이터 (us_market / commodities / forex 고정 하위 키).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub us_market: UsMarket,
    #[serde(default)]
    pub commodities: HashMap<String, SectorMove>,
    #[serde(default)]
    pub forex: HashMap<String, String>,
}

impl MarketSnapshot {
    pub fn is_empty(&self) -> bool {
        self.us_market.sectors.is_empty() && self.commodities.is_empty() && self.forex.is_empty()
    }
}

/// 종목별 전날 시세 1행.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceRow {
    #[serde(rename = "종목명", default)]
    pub name: String,
    #[serde(rename = "종목코드", default)]
    pub code: String,
    #[serde(rename = "등락률", default)]
    pub change_rate: f64,
    #[serde(rename = "종가", default)]
    pub close: i64,
    #[serde(rename = "거래량", default)]
    pub volume: i64,
    #[serde(rename = "시가총액", default)]
    pub market_cap: i64,
    #[serde(rename = "섹터", default)]
    pub sector: String,
}

/// 지수 스냅샷.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSnapshot {
    #[serde(rename = "지수", default)]
    pub level: f64,
    #[serde(rename = "등락률", default)]
    pub change_rate: f64,
}

/// 전날 국내 시세 묶음. 수집 실패 시 캐시에는 null(None)로 들어간다 —
/// 빈 묶음과 null의 구분은 계약이다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceData {
    #[serde(default)]
    pub by_code: HashMap<String, PriceRow>,
    #[serde(default)]
    pub by_name: HashMap<String, PriceRow>,
    #[serde(default)]
    pub by_sector: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub upper_limit: Vec<PriceRow>,
    #[serde(default)]
    pub top_gainers: Vec<PriceRow>,
    #[serde(default)]
    pub top_losers: Vec<PriceRow>,
    #[serde(default)]
    pub institutional: Vec<Value>,
    #[serde(default)]
    pub kospi: IndexSnapshot,
    #[serde(default)]
    pub kosdaq: IndexSnapshot,
}

impl PriceData {
    /// 종목코드 → 시가총액 (by_code 우선, by_name 보조).
    pub fn market_cap_of(&self, code: &str, name: &str) -> i64 {
        if let Some(row) = self.by_code.get(code) {
            return row.market_cap;
        }
        if let Some(row) = self.by_name.get(name) {
            return row.market_cap;
        }
        0
    }

    /// 종목코드 → 전일 거래량 맵 (워치리스트 구성용).
    pub fn prev_volumes(&self) -> HashMap<String, i64> {
        self.by_code
            .iter()
            .map(|(code, row)| (code.clone(), row.volume.max(1)))
            .collect()
    }

    /// 종목코드 → 섹터 맵.
    pub fn sector_map(&self) -> HashMap<String, String> {
        self.by_code
            .iter()
            .filter(|(_, row)| !row.sector.is_empty())
            .map(|(code, row)| (code.clone(), row.sector.clone()))
            .collect()
    }
}

/// 섹터 ETF 자금흐름 1행.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectorEtfFlow {
    #[serde(rename = "섹터", default)]
    pub sector: String,
    #[serde(rename = "등락률", default)]
    pub change_rate: f64,
    #[serde(rename = "자금흐름", default)]
    pub flow: String,
}

/// 공매도 잔고 1행.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShortInterestRow {
    #[serde(rename = "종목명", default)]
    pub name: String,
    #[serde(rename = "종목코드", default)]
    pub code: String,
    #[serde(rename = "공매도비율", default)]
    pub short_ratio: f64,
}

/// 마감강도 1행.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrengthRow {
    #[serde(rename = "종목명", default)]
    pub name: String,
    #[serde(rename = "종목코드", default)]
    pub code: String,
    #[serde(rename = "마감강도", default)]
    pub strength: f64,
}

/// 거래량 급증 1행.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurgeRow {
    #[serde(rename = "종목명", default)]
    pub name: String,
    #[serde(rename = "종목코드", default)]
    pub code: String,
    #[serde(rename = "거래량배율", default)]
    pub volume_ratio: f64,
}

/// 자금집중 1행 (거래대금/시총 비율).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcentrationRow {
    #[serde(rename = "종목명", default)]
    pub name: String,
    #[serde(rename = "종목코드", default)]
    pub code: String,
    #[serde(rename = "거래대금시총비율", default)]
    pub ratio: f64,
}

/// 뉴스 데이터 — 평면 목록 또는 카테고리별 목록 모두 허용.
pub fn flatten_news(news: &Value) -> Vec<Value> {
    match news {
        Value::Array(items) => items.clone(),
        Value::Object(map) => {
            let mut out = Vec::new();
            for v in map.values() {
                match v {
                    Value::Array(items) => out.extend(items.iter().cloned()),
                    Value::Object(_) => out.push(v.clone()),
                    _ => {}
                }
            }
            out
        }
        _ => Vec::new(),
    }
}

/// 12개 수집기 인터페이스 — 구현은 외부 협력자.
///
/// 날짜 인자를 받는 수집기는 전날(prev) 또는 당일(today) 기준이다.
/// 전날이 None(주말 호출)이면 구현체가 빈 값을 돌려준다.
#[async_trait]
pub trait CollectorSuite: Send + Sync {
    async fn filings(&self, prev: NaiveDate) -> BotResult<Vec<FilingRecord>>;
    async fn market_global(&self, prev: NaiveDate) -> BotResult<MarketSnapshot>;
    async fn news_naver(&self, today: NaiveDate) -> BotResult<Value>;
    async fn news_newsapi(&self, today: NaiveDate) -> BotResult<Value>;
    async fn news_global_rss(&self) -> BotResult<Vec<Value>>;
    async fn price_domestic(&self, prev: NaiveDate) -> BotResult<PriceData>;
    async fn sector_etf(&self, prev: NaiveDate) -> BotResult<Vec<SectorEtfFlow>>;
    async fn short_interest(&self, prev: NaiveDate) -> BotResult<Vec<ShortInterestRow>>;
    async fn event_calendar(&self, today: NaiveDate) -> BotResult<Vec<Value>>;
    async fn closing_strength(&self, prev_ymd: &str) -> BotResult<Vec<StrengthRow>>;
    async fn volume_surge(&self, prev_ymd: &str) -> BotResult<Vec<SurgeRow>>;
    async fn fund_concentration(&self, prev_ymd: &str) -> BotResult<Vec<ConcentrationRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_news_variants() {
        let flat = json!([{"title": "a"}, {"title": "b"}]);
        assert_eq!(flatten_news(&flat).len(), 2);

        let by_category = json!({
            "경제": [{"title": "a"}],
            "정책": [{"title": "b"}, {"title": "c"}],
            "단일": {"title": "d"}
        });
        assert_eq!(flatten_news(&by_category).len(), 4);

        assert!(flatten_news(&json!(null)).is_empty());
    }

    #[test]
    fn test_price_data_lookups() {
        let mut data = PriceData::default();
        data.by_code.insert(
            "005930".to_string(),
            PriceRow {
                name: "삼성전자".to_string(),
                code: "005930".to_string(),
                market_cap: 400_000_000_000,
                volume: 0,
                sector: "반도체".to_string(),
                ..Default::default()
            },
        );
        data.by_name.insert(
            "카카오".to_string(),
            PriceRow {
                market_cap: 50_000_000_000,
                ..Default::default()
            },
        );

        assert_eq!(data.market_cap_of("005930", ""), 400_000_000_000);
        assert_eq!(data.market_cap_of("", "카카오"), 50_000_000_000);
        assert_eq!(data.market_cap_of("999999", "없음"), 0);

        // 거래량 0 → 1로 클램프
        assert_eq!(data.prev_volumes()["005930"], 1);
        assert_eq!(data.sector_map()["005930"], "반도체");
    }

    #[test]
    fn test_filing_korean_wire_names() {
        let json = r#"{"종목명":"예시","공시종류":"단일판매공급계약","규모":"320억","본문요약":"수주","시가총액":80000000000}"#;
        let filing: FilingRecord = serde_json::from_str(json).unwrap();
        assert_eq!(filing.name, "예시");
        assert_eq!(filing.market_cap, 80_000_000_000);
    }
}
