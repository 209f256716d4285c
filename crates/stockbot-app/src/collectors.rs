//! 수집기 묶음 기본 구현.
//!
//! 시세 계열(가격·마감강도·거래량급증·자금집중)은 브로커 순위 API로
//! 채운다. 웹 크롤링 계열(DART·뉴스·RSS·섹터 ETF·공매도·이벤트 캘린더)은
//! 외부 수집기 연동이 없으면 빈 값으로 degrade한다 — success_flags가
//! false로 남아 06:00 요약에서 운영자 눈에 띈다.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use stockbot_collector::{
    CollectorSuite, ConcentrationRow, FilingRecord, MarketSnapshot, PriceData, PriceRow,
    SectorEtfFlow, ShortInterestRow, StrengthRow, SurgeRow,
};
use stockbot_core::{BotError, BotResult};
use stockbot_exchange::{Broker, Market, RankedStock};
use stockbot_tracking::ClosePriceSource;

/// 브로커 기반 수집기 묶음.
pub struct BrokerBackedCollectors {
    broker: Arc<dyn Broker>,
}

impl BrokerBackedCollectors {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// 양 시장 등락률 순위 합산.
    async fn all_change_ranks(&self) -> BotResult<Vec<RankedStock>> {
        let mut rows = Vec::new();
        for market in [Market::Kospi, Market::Kosdaq] {
            rows.extend(
                self.broker
                    .get_change_rank(market)
                    .await
                    .map_err(|e| BotError::Collector(e.to_string()))?,
            );
        }
        Ok(rows)
    }

    /// 양 시장 거래량 순위 합산.
    async fn all_volume_ranks(&self) -> BotResult<Vec<RankedStock>> {
        let mut rows = Vec::new();
        for market in [Market::Kospi, Market::Kosdaq] {
            rows.extend(
                self.broker
                    .get_volume_rank(market)
                    .await
                    .map_err(|e| BotError::Collector(e.to_string()))?,
            );
        }
        Ok(rows)
    }
}

fn to_price_row(row: &RankedStock) -> PriceRow {
    PriceRow {
        name: row.name.clone(),
        code: row.code.clone(),
        change_rate: row.change_rate,
        close: row.price,
        volume: row.cum_volume,
        market_cap: row.market_cap_100m * 100_000_000,
        sector: String::new(),
    }
}

#[async_trait]
impl CollectorSuite for BrokerBackedCollectors {
    async fn filings(&self, _prev: NaiveDate) -> BotResult<Vec<FilingRecord>> {
        debug!("DART 수집기 미구성 — 빈 값");
        Ok(Vec::new())
    }

    async fn market_global(&self, _prev: NaiveDate) -> BotResult<MarketSnapshot> {
        debug!("글로벌 시장 수집기 미구성 — 빈 값");
        Ok(MarketSnapshot::default())
    }

    async fn news_naver(&self, _today: NaiveDate) -> BotResult<Value> {
        Ok(Value::Object(Default::default()))
    }

    async fn news_newsapi(&self, _today: NaiveDate) -> BotResult<Value> {
        Ok(Value::Object(Default::default()))
    }

    async fn news_global_rss(&self) -> BotResult<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn price_domestic(&self, _prev: NaiveDate) -> BotResult<PriceData> {
        let rows = self.all_change_ranks().await?;

        let mut data = PriceData::default();
        for row in &rows {
            let price_row = to_price_row(row);
            if row.change_rate >= 29.5 {
                data.upper_limit.push(price_row.clone());
            } else if row.change_rate >= 15.0 {
                data.top_gainers.push(price_row.clone());
            }
            if !row.code.is_empty() {
                data.by_code.insert(row.code.clone(), price_row.clone());
            }
            if !row.name.is_empty() {
                data.by_name.insert(row.name.clone(), price_row);
            }
        }
        Ok(data)
    }

    async fn sector_etf(&self, _prev: NaiveDate) -> BotResult<Vec<SectorEtfFlow>> {
        Ok(Vec::new())
    }

    async fn short_interest(&self, _prev: NaiveDate) -> BotResult<Vec<ShortInterestRow>> {
        Ok(Vec::new())
    }

    async fn event_calendar(&self, _today: NaiveDate) -> BotResult<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn closing_strength(&self, _prev_ymd: &str) -> BotResult<Vec<StrengthRow>> {
        // 마감강도 근사: 등락률 상위 종목의 등락률을 강도로 사용
        let rows = self.all_change_ranks().await?;
        Ok(rows
            .iter()
            .take(20)
            .map(|r| StrengthRow {
                name: r.name.clone(),
                code: r.code.clone(),
                strength: r.change_rate,
            })
            .collect())
    }

    async fn volume_surge(&self, _prev_ymd: &str) -> BotResult<Vec<SurgeRow>> {
        let mut rows = self.all_volume_ranks().await?;
        rows.sort_by(|a, b| {
            let ratio_a = a.cum_volume as f64 / a.prev_volume.max(1) as f64;
            let ratio_b = b.cum_volume as f64 / b.prev_volume.max(1) as f64;
            ratio_b.partial_cmp(&ratio_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rows
            .iter()
            .filter(|r| r.cum_volume as f64 / r.prev_volume.max(1) as f64 >= 5.0)
            .take(20)
            .map(|r| SurgeRow {
                name: r.name.clone(),
                code: r.code.clone(),
                volume_ratio: r.cum_volume as f64 / r.prev_volume.max(1) as f64,
            })
            .collect())
    }

    async fn fund_concentration(&self, _prev_ymd: &str) -> BotResult<Vec<ConcentrationRow>> {
        // 거래대금/시총 비율 = (누적거래량 × 현재가) / 시가총액
        let mut rows: Vec<(RankedStock, f64)> = self
            .all_volume_ranks()
            .await?
            .into_iter()
            .filter(|r| r.market_cap_100m > 0)
            .map(|r| {
                let turnover = r.cum_volume as f64 * r.price as f64;
                let ratio = turnover / (r.market_cap_100m as f64 * 100_000_000.0) * 100.0;
                (r, ratio)
            })
            .collect();
        rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(rows
            .into_iter()
            .take(20)
            .map(|(r, ratio)| ConcentrationRow {
                name: r.name,
                code: r.code,
                ratio: (ratio * 10.0).round() / 10.0,
            })
            .collect())
    }
}

/// 브로커 순위 기반 종가 소스 (수익률 정산용).
///
/// 순위에 없는 종목은 종가 미상으로 남는다 — 해당 행은 done 표시만 된다.
pub struct RankingCloseSource {
    broker: Arc<dyn Broker>,
}

impl RankingCloseSource {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl ClosePriceSource for RankingCloseSource {
    async fn closing_prices(&self, _date_ymd: &str) -> BotResult<HashMap<String, i64>> {
        let mut map = HashMap::new();
        for market in [Market::Kospi, Market::Kosdaq] {
            let rows = self
                .broker
                .get_volume_rank(market)
                .await
                .map_err(|e| BotError::Collector(e.to_string()))?;
            for row in rows {
                if !row.code.is_empty() && row.price > 0 {
                    map.insert(row.code, row.price);
                }
            }
        }
        Ok(map)
    }
}
