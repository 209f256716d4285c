//! 당일 캐시 — 키 집합 고정, 프로세스 전역 단일 값.
//!
//! 06:00 수집이 한 번 쓰고, 이후 아침봇·명령 핸들러가 읽는다 (read-mostly).
//! `price_data`만 Option이다: 시세 수집 실패는 "빈 값"이 아니라
//! "조회 불가"로 구분해 하류가 하드 실패 처리를 한다.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stockbot_core::now_kst;

use crate::contracts::{
    ConcentrationRow, FilingRecord, MarketSnapshot, PriceData, SectorEtfFlow, ShortInterestRow,
    StrengthRow, SurgeRow,
};

/// 수집기 이름 — success_flags 키 집합 (순서 고정).
pub const COLLECTOR_NAMES: [&str; 12] = [
    "filings",
    "market_global",
    "news_naver",
    "news_newsapi",
    "news_global_rss",
    "price_domestic",
    "sector_etf",
    "short_interest",
    "event_calendar",
    "closing_strength",
    "volume_surge",
    "fund_concentration",
];

/// 당일 수집 캐시.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyCache {
    /// 수집 시각 (KST ISO)
    pub collected_at: String,
    pub dart_data: Vec<FilingRecord>,
    pub market_data: MarketSnapshot,
    pub news_naver: Value,
    pub news_newsapi: Value,
    pub news_global_rss: Vec<Value>,
    /// None = 시세 수집 실패 (빈 묶음과 구분되는 계약)
    pub price_data: Option<PriceData>,
    pub sector_etf_data: Vec<SectorEtfFlow>,
    pub short_data: Vec<ShortInterestRow>,
    pub event_calendar: Vec<Value>,
    pub closing_strength_result: Vec<StrengthRow>,
    pub volume_surge_result: Vec<SurgeRow>,
    pub fund_concentration_result: Vec<ConcentrationRow>,
    pub success_flags: BTreeMap<String, bool>,
}

impl DailyCache {
    /// 수집 나이가 `max_age_minutes` 이내면 true.
    pub fn is_fresh(&self, max_age_minutes: i64) -> bool {
        if self.collected_at.is_empty() {
            return false;
        }
        match DateTime::parse_from_rfc3339(&self.collected_at) {
            Ok(collected) => {
                let age_min = (now_kst().fixed_offset() - collected).num_minutes();
                age_min <= max_age_minutes
            }
            Err(_) => false,
        }
    }

    /// 실패한 수집기 이름 목록.
    pub fn failed_collectors(&self) -> Vec<&str> {
        COLLECTOR_NAMES
            .iter()
            .filter(|name| !self.success_flags.get(**name).copied().unwrap_or(false))
            .copied()
            .collect()
    }
}

/// 프로세스 전역 캐시 슬롯.
///
/// 06:00 수집이 유일한 작성자, 이후는 읽기 전용.
#[derive(Default)]
pub struct CacheSlot {
    inner: RwLock<Option<DailyCache>>,
}

impl CacheSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 캐시 교체 (수집 완료 시 1회).
    pub fn store(&self, cache: DailyCache) {
        *self.inner.write().unwrap() = Some(cache);
    }

    /// 캐시 복사본. 미수집이면 None.
    pub fn load(&self) -> Option<DailyCache> {
        self.inner.read().unwrap().clone()
    }

    /// 캐시가 존재하고 `max_age_minutes` 이내인가.
    pub fn is_fresh(&self, max_age_minutes: i64) -> bool {
        self.inner
            .read()
            .unwrap()
            .as_ref()
            .map(|c| c.is_fresh(max_age_minutes))
            .unwrap_or(false)
    }
}
