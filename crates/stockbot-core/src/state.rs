//! 아침봇 → 장중봇 공유 상태.
//!
//! 프로세스 전역 단일 슬롯 3개를 보관한다:
//! - 픽 워치리스트 (오케스트레이터가 아침봇 완료 후 기록, 장중봇이 읽음)
//! - 시장 환경 (KOSPI 기반)
//! - 종목 → 섹터 맵
//!
//! 쓰기는 오케스트레이터 단일 작성자, 읽기는 다수. 락은 await를 끼지 않는
//! 짧은 구간에서만 잡는다.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

use crate::domain::{MarketRegime, Pick, WatchEntry};

/// 아침봇 → 장중봇 공유 상태.
#[derive(Default)]
pub struct WatchlistState {
    /// {종목코드: 감시 메타데이터}
    watchlist: RwLock<HashMap<String, WatchEntry>>,
    /// 픽 원본 (장중봇이 목표/손절/근거를 읽는다)
    picks: RwLock<Vec<Pick>>,
    /// 시장 환경
    market_env: RwLock<Option<MarketRegime>>,
    /// KOSPI 지수 레벨 (지수 통계용 스냅샷)
    kospi_level: RwLock<Option<f64>>,
    /// {종목코드: 섹터명}
    sector_map: RwLock<HashMap<String, String>>,
}

impl WatchlistState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 아침봇 완료 후 픽 목록과 전일 거래량으로 워치리스트를 설정한다.
    ///
    /// 유효한 6자리 종목코드가 있는 픽만 등록된다.
    pub fn set_picks(&self, picks: Vec<Pick>, prev_volumes: &HashMap<String, i64>) {
        let mut map = HashMap::new();
        for pick in &picks {
            if !pick.has_valid_code() {
                continue;
            }
            let prev_vol = prev_volumes.get(&pick.stock_code).copied().unwrap_or(1);
            map.insert(pick.stock_code.clone(), WatchEntry::from_pick(pick, prev_vol));
        }

        let count = map.len();
        *self.watchlist.write().unwrap() = map;
        *self.picks.write().unwrap() = picks;
        info!("워치리스트 저장 완료 — {}종목", count);
    }

    /// 워치리스트 복사본. 반환값 변경은 내부 상태에 영향 없음.
    pub fn get_watchlist(&self) -> HashMap<String, WatchEntry> {
        self.watchlist.read().unwrap().clone()
    }

    /// 픽 원본 복사본.
    pub fn get_picks(&self) -> Vec<Pick> {
        self.picks.read().unwrap().clone()
    }

    /// 해당 종목이 오늘 픽에 포함되는지.
    pub fn contains(&self, ticker: &str) -> bool {
        self.watchlist.read().unwrap().contains_key(ticker)
    }

    /// 아침봇이 워치리스트를 설정했는지.
    pub fn is_ready(&self) -> bool {
        !self.watchlist.read().unwrap().is_empty()
    }

    /// 시장 환경 기록 (오케스트레이터 전용).
    pub fn set_market_env(&self, regime: MarketRegime) {
        *self.market_env.write().unwrap() = Some(regime);
        info!("시장 환경 설정 — {}", regime);
    }

    /// KOSPI 등락률로 시장 환경 유도 후 기록.
    pub fn set_market_env_from_kospi(&self, kospi_change_pct: f64) -> MarketRegime {
        let regime = MarketRegime::from_kospi_change(kospi_change_pct);
        self.set_market_env(regime);
        regime
    }

    /// KOSPI 지수 스냅샷 기록 (레벨 + 등락률 → 환경).
    pub fn set_kospi_snapshot(&self, level: f64, change_pct: f64) -> MarketRegime {
        *self.kospi_level.write().unwrap() = Some(level);
        self.set_market_env_from_kospi(change_pct)
    }

    /// 진입 시점 시장 컨텍스트 문자열 (예: "강세장 KOSPI2547").
    ///
    /// KOSPI 레벨 미기록이면 환경 라벨만 반환한다.
    pub fn market_context(&self) -> String {
        let regime = self.market_env();
        match *self.kospi_level.read().unwrap() {
            Some(level) => format!("{} KOSPI{}", regime, level as i64),
            None => regime.to_string(),
        }
    }

    /// 현재 시장 환경 (미설정이면 횡보).
    pub fn market_env(&self) -> MarketRegime {
        self.market_env.read().unwrap().unwrap_or_default()
    }

    /// 섹터 맵 설정 (price_data.by_code 기반).
    pub fn set_sector_map(&self, map: HashMap<String, String>) {
        *self.sector_map.write().unwrap() = map;
    }

    /// 종목의 섹터 조회.
    pub fn sector_of(&self, ticker: &str) -> Option<String> {
        self.sector_map.read().unwrap().get(ticker).cloned()
    }

    /// 장 마감 후 전체 초기화.
    pub fn clear(&self) {
        self.watchlist.write().unwrap().clear();
        self.picks.write().unwrap().clear();
        *self.market_env.write().unwrap() = None;
        *self.kospi_level.write().unwrap() = None;
        self.sector_map.write().unwrap().clear();
        info!("워치리스트 초기화");
    }
}
