//! REST 폴링 감시자.
//!
//! 픽 종목만 개별 조회하며, 종목별 조건은 엄격한 순서로 평가한다:
//! ① 가격 도달 (목표/손절) → ② 급등 모멘텀 → ③ 매수벽.
//! 첫 충족 조건에서 알림을 만들고 다음 종목으로 넘어간다.
//!
//! 첫 폴링 사이클은 워밍업이다 — 스냅샷만 저장하고 알림은 내지 않는다.
//! 스냅샷·중복 방지 집합은 모두 이 구조체 소유로, 단일 폴링 태스크에서만
//! 변경된다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use stockbot_core::{
    now_kst, AlertSource, AlertType, IntradayAlert, Pick, WatchConfig, WatchlistState,
};
use stockbot_exchange::Broker;

use crate::orderbook::analyze_orderbook;

/// 상한가 인접 판정 기준 (%).
const UPPER_LIMIT_ADJACENT: f64 = 29.5;

/// 목표등락률 도달 판정 비율.
const TARGET_REACH_RATIO: f64 = 0.9;

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    change_rate: f64,
    cum_volume: i64,
}

/// 픽 전담 폴링 감시자.
pub struct IntradayWatcher {
    broker: Arc<dyn Broker>,
    state: Arc<WatchlistState>,
    config: WatchConfig,
    /// {종목코드: 직전 사이클 스냅샷}
    snapshots: HashMap<String, Snapshot>,
    /// {종목코드: 급등모멘텀 연속 확인 횟수}
    confirm_counts: HashMap<String, u32>,
    /// 가격 도달 알림 중복 방지 (당일 종목별 1회)
    price_alerted: HashSet<String>,
    /// 매수벽 알림 중복 방지 (종목×분 단위)
    bidwall_alerted: HashSet<String>,
}

impl IntradayWatcher {
    pub fn new(broker: Arc<dyn Broker>, state: Arc<WatchlistState>, config: WatchConfig) -> Self {
        Self {
            broker,
            state,
            config,
            snapshots: HashMap::new(),
            confirm_counts: HashMap::new(),
            price_alerted: HashSet::new(),
            bidwall_alerted: HashSet::new(),
        }
    }

    /// 장 마감 후 상태 전체 초기화.
    pub fn reset(&mut self) {
        self.snapshots.clear();
        self.confirm_counts.clear();
        self.price_alerted.clear();
        self.bidwall_alerted.clear();
        info!("워치리스트 스냅샷·카운터·중복방지 상태 초기화");
    }

    /// 폴링 1사이클 — 조건 충족 알림 목록 반환.
    ///
    /// 워치리스트가 비어 있으면 브로커 호출 없이 빈 목록.
    pub async fn poll_all_markets(&mut self) -> Vec<IntradayAlert> {
        let picks = self.state.get_picks();
        if picks.is_empty() {
            debug!("워치리스트 없음 — poll 생략");
            return Vec::new();
        }

        let is_warmup = self.snapshots.is_empty();
        let mut alerts = Vec::new();
        let mut current: HashMap<String, Snapshot> = HashMap::new();

        for pick in &picks {
            if !pick.has_valid_code() {
                continue;
            }
            let ticker = pick.stock_code.clone();

            let price = match self.broker.get_price(&ticker).await {
                Ok(p) => p,
                Err(e) => {
                    warn!("{}({}) 조회 실패: {}", pick.stock_name, ticker, e);
                    continue;
                }
            };
            if price.last <= 0 {
                continue;
            }

            current.insert(
                ticker.clone(),
                Snapshot {
                    change_rate: price.change_pct,
                    cum_volume: price.cum_volume,
                },
            );

            if is_warmup {
                continue;
            }

            let prev = self.snapshots.get(&ticker).copied();

            // ── ① 가격 도달 (당일 종목별 1회) ────────────────
            if !self.price_alerted.contains(&ticker) {
                if let Some(alert_type) =
                    check_price_trigger(pick, price.last, price.change_pct)
                {
                    self.price_alerted.insert(ticker.clone());
                    let orderbook = self.maybe_orderbook(&ticker).await;
                    alerts.push(self.build_alert(
                        pick,
                        price.last,
                        price.change_pct,
                        prev,
                        orderbook,
                        alert_type,
                    ));
                    info!(
                        "{} — {} {:+.1}% / 현재가={}원",
                        alert_type, pick.stock_name, price.change_pct, price.last
                    );
                    continue;
                }
            }

            // ── ② 급등 모멘텀 ────────────────────────────────
            if let Some(prev_snap) = prev {
                let delta_rate = price.change_pct - prev_snap.change_rate;
                let prev_vol = prev_snap.cum_volume.max(1);
                let delta_vol = (price.cum_volume - prev_vol).max(0);
                let strength = delta_vol as f64 / prev_vol as f64 * 100.0;

                let single_ok = delta_rate >= self.config.price_delta_min
                    && strength >= self.config.volume_delta_min;
                let count = if single_ok {
                    self.confirm_counts.get(&ticker).copied().unwrap_or(0) + 1
                } else {
                    0
                };
                self.confirm_counts.insert(ticker.clone(), count);

                if count >= self.config.confirm_candles {
                    self.confirm_counts.insert(ticker.clone(), 0);
                    let orderbook = self.maybe_orderbook(&ticker).await;
                    let mut alert = self.build_alert(
                        pick,
                        price.last,
                        price.change_pct,
                        prev,
                        orderbook,
                        AlertType::SurgeMomentum,
                    );
                    alert.delta_rate = (delta_rate * 100.0).round() / 100.0;
                    alert.momentary_strength = (strength * 10.0).round() / 10.0;
                    alert.volume_ratio =
                        ((price.cum_volume as f64 / prev_vol as f64) * 100.0).round() / 100.0;
                    alerts.push(alert);
                    info!(
                        "급등모멘텀 — {} Δ등락률={:+.2}% 순간강도={:.1}%",
                        pick.stock_name, delta_rate, strength
                    );
                    continue;
                }
            }

            // ── ③ 매수벽 (등락률 기준 충족 종목 한정) ────────
            if self.config.orderbook_enabled && price.change_pct >= self.config.min_change_rate {
                let minute_key =
                    format!("{}_ob_{}", ticker, now_kst().format("%H:%M"));
                if !self.bidwall_alerted.contains(&minute_key) {
                    if let Some(report) = self.maybe_orderbook(&ticker).await {
                        if report.strength == stockbot_core::OrderbookStrength::Strong {
                            self.bidwall_alerted.insert(minute_key);
                            info!(
                                "매수벽 — {} 매수매도비율={:.2}",
                                pick.stock_name, report.bid_ask_ratio
                            );
                            alerts.push(self.build_alert(
                                pick,
                                price.last,
                                price.change_pct,
                                prev,
                                Some(report),
                                AlertType::BidWall,
                            ));
                        }
                    }
                }
            }
        }

        self.snapshots = current;

        if is_warmup {
            info!(
                "워밍업 완료 — 픽 {}종목 스냅샷 저장 / 다음 사이클부터 감시 시작",
                picks.len()
            );
        }
        if !alerts.is_empty() {
            info!("픽 감시 알림 {}건", alerts.len());
        }

        alerts
    }

    async fn maybe_orderbook(
        &self,
        ticker: &str,
    ) -> Option<stockbot_core::OrderbookReport> {
        if !self.config.orderbook_enabled {
            return None;
        }
        match self.broker.get_orderbook(ticker).await {
            Ok(ob) => analyze_orderbook(&ob, &self.config),
            Err(e) => {
                debug!("{} 호가 조회 실패: {}", ticker, e);
                None
            }
        }
    }

    fn build_alert(
        &self,
        pick: &Pick,
        current_price: i64,
        change_rate: f64,
        prev: Option<Snapshot>,
        orderbook_analysis: Option<stockbot_core::OrderbookReport>,
        alert_type: AlertType,
    ) -> IntradayAlert {
        let prev_rate = prev.map(|s| s.change_rate).unwrap_or(change_rate);
        IntradayAlert {
            stock_code: pick.stock_code.clone(),
            stock_name: pick.stock_name.clone(),
            current_price,
            change_rate,
            delta_rate: ((change_rate - prev_rate) * 100.0).round() / 100.0,
            volume_ratio: 0.0,
            momentary_strength: 0.0,
            condition_met: true,
            detected_at: now_kst().format("%H:%M:%S").to_string(),
            source: AlertSource::Watchlist,
            orderbook_analysis,
            pick_reason: pick.reason.clone(),
            alert_type,
        }
    }
}

/// 모닝봇 근거 기준 가격 도달 조건 판단.
fn check_price_trigger(pick: &Pick, current_price: i64, change_rate: f64) -> Option<AlertType> {
    // 상한가 인접 (29.5%+)
    if change_rate >= UPPER_LIMIT_ADJACENT {
        return Some(AlertType::PriceTarget);
    }

    // 목표 등락률 90% 이상 도달
    if let Some(target) = pick.target_pct() {
        if change_rate >= target * TARGET_REACH_RATIO {
            return Some(AlertType::PriceTarget);
        }
    }

    // 손절 기준 도달 — 가격(원) 또는 비율(%) 두 형태
    let stop = pick.stop_loss.trim();
    if !stop.is_empty() {
        if stop.contains('원') {
            // 가격 기준: "9,500원 하향 시", "9500원" 등 — 원 앞의 마지막 숫자
            let price_part = stop.split('원').next().unwrap_or("");
            let digits: String = price_part
                .chars()
                .rev()
                .take_while(|c| c.is_ascii_digit() || *c == ',')
                .collect::<String>()
                .chars()
                .rev()
                .collect();
            if let Ok(stop_price) = digits.replace(',', "").parse::<i64>() {
                if stop_price > 0 && current_price <= stop_price {
                    return Some(AlertType::PriceStop);
                }
            }
        } else if let Ok(stop_pct) = stop.replace('%', "").replace(',', "").trim().parse::<f64>() {
            if stop_pct < 0.0 && change_rate <= stop_pct {
                return Some(AlertType::PriceStop);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use stockbot_core::{CapTier, PickCategory};
    use stockbot_exchange::{
        Balance, ExchangeError, ExchangeResult, Market, Orderbook, OrderbookLevel, OrderResult,
        RankedStock, StockPrice,
    };

    /// 설정 가능한 가짜 브로커.
    struct FakeBroker {
        prices: Mutex<StdHashMap<String, StockPrice>>,
        orderbooks: Mutex<StdHashMap<String, Orderbook>>,
        price_calls: AtomicUsize,
    }

    impl FakeBroker {
        fn new() -> Self {
            Self {
                prices: Mutex::new(StdHashMap::new()),
                orderbooks: Mutex::new(StdHashMap::new()),
                price_calls: AtomicUsize::new(0),
            }
        }

        fn set_price(&self, ticker: &str, last: i64, change_pct: f64, cum_volume: i64) {
            self.prices.lock().unwrap().insert(
                ticker.to_string(),
                StockPrice {
                    name: ticker.to_string(),
                    last,
                    open: last,
                    change_pct,
                    cum_volume,
                },
            );
        }

        fn set_strong_orderbook(&self, ticker: &str) {
            self.orderbooks.lock().unwrap().insert(
                ticker.to_string(),
                Orderbook {
                    ticker: ticker.to_string(),
                    asks: vec![OrderbookLevel { price: 1, qty: 100 }],
                    bids: vec![OrderbookLevel { price: 1, qty: 300 }],
                    total_ask: 100,
                    total_bid: 300,
                },
            );
        }
    }

    #[async_trait]
    impl Broker for FakeBroker {
        async fn get_price(&self, ticker: &str) -> ExchangeResult<StockPrice> {
            self.price_calls.fetch_add(1, Ordering::SeqCst);
            self.prices
                .lock()
                .unwrap()
                .get(ticker)
                .cloned()
                .ok_or_else(|| ExchangeError::NetworkError("가격 없음".to_string()))
        }

        async fn get_orderbook(&self, ticker: &str) -> ExchangeResult<Orderbook> {
            self.orderbooks
                .lock()
                .unwrap()
                .get(ticker)
                .cloned()
                .ok_or_else(|| ExchangeError::NetworkError("호가 없음".to_string()))
        }

        async fn get_volume_rank(&self, _market: Market) -> ExchangeResult<Vec<RankedStock>> {
            Ok(Vec::new())
        }

        async fn get_change_rank(&self, _market: Market) -> ExchangeResult<Vec<RankedStock>> {
            Ok(Vec::new())
        }

        async fn buy(
            &self,
            _ticker: &str,
            _name: &str,
            _amount_krw: i64,
        ) -> ExchangeResult<OrderResult> {
            Ok(OrderResult::default())
        }

        async fn sell(&self, _ticker: &str, _name: &str, _qty: i64) -> ExchangeResult<OrderResult> {
            Ok(OrderResult::default())
        }

        async fn get_balance(&self) -> ExchangeResult<Balance> {
            Ok(Balance::default())
        }
    }

    fn config() -> WatchConfig {
        WatchConfig {
            poll_interval_sec: 30,
            price_delta_min: 1.0,
            volume_delta_min: 30.0,
            confirm_candles: 2,
            min_change_rate: 3.0,
            orderbook_enabled: false,
            orderbook_bid_ask_good: 2.0,
            orderbook_bid_ask_min: 1.3,
            orderbook_top3_ratio_min: 0.5,
            ws_enabled: false,
            ws_watchlist_max: 40,
        }
    }

    fn pick(code: &str, target: &str, stop: &str) -> Pick {
        Pick {
            rank: 1,
            stock_code: code.to_string(),
            stock_name: format!("종목{}", code),
            reason: "수주 공시".to_string(),
            category: PickCategory::Filing,
            target_return: target.to_string(),
            stop_loss: stop.to_string(),
            is_theme: false,
            entry_window: String::new(),
            cap_tier: CapTier::Small300,
        }
    }

    fn state_with(picks: Vec<Pick>) -> Arc<WatchlistState> {
        let state = Arc::new(WatchlistState::new());
        state.set_picks(picks, &StdHashMap::new());
        state
    }

    #[tokio::test]
    async fn test_empty_watchlist_no_broker_calls() {
        let broker = Arc::new(FakeBroker::new());
        let state = Arc::new(WatchlistState::new());
        let mut watcher = IntradayWatcher::new(Arc::clone(&broker) as _, state, config());

        let alerts = watcher.poll_all_markets().await;
        assert!(alerts.is_empty());
        assert_eq!(broker.price_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_warmup_cycle_no_alerts() {
        let broker = Arc::new(FakeBroker::new());
        broker.set_price("005930", 70_000, 10.0, 1_000);
        let state = state_with(vec![pick("005930", "5%", "-3%")]);
        let mut watcher = IntradayWatcher::new(Arc::clone(&broker) as _, state, config());

        // 목표를 이미 넘긴 상태여도 워밍업에서는 알림 없음
        let alerts = watcher.poll_all_markets().await;
        assert!(alerts.is_empty());
        assert!(!watcher.snapshots.is_empty());
    }

    #[tokio::test]
    async fn test_price_target_fires_once_per_day() {
        let broker = Arc::new(FakeBroker::new());
        broker.set_price("005930", 70_000, 0.0, 1_000);
        let state = state_with(vec![pick("005930", "5%", "-3%")]);
        let mut watcher = IntradayWatcher::new(Arc::clone(&broker) as _, state, config());

        watcher.poll_all_markets().await; // 워밍업

        // 4.7% ≥ 0.9 × 5.0 → 목표 도달
        broker.set_price("005930", 73_290, 4.7, 1_100);
        let alerts = watcher.poll_all_markets().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::PriceTarget);
        assert_eq!(alerts[0].stock_code, "005930");
        assert_eq!(alerts[0].source, AlertSource::Watchlist);

        // 같은 날 재도달 → 중복 알림 없음
        broker.set_price("005930", 73_500, 5.0, 1_200);
        let alerts = watcher.poll_all_markets().await;
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_price_stop_by_price_level() {
        let broker = Arc::new(FakeBroker::new());
        broker.set_price("005930", 10_000, 0.0, 1_000);
        let state = state_with(vec![pick("005930", "20%", "9,500원 하향 시")]);
        let mut watcher = IntradayWatcher::new(Arc::clone(&broker) as _, state, config());

        watcher.poll_all_markets().await; // 워밍업

        broker.set_price("005930", 9_400, -6.0, 1_100);
        let alerts = watcher.poll_all_markets().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::PriceStop);
    }

    #[tokio::test]
    async fn test_surge_momentum_requires_consecutive_confirms() {
        let broker = Arc::new(FakeBroker::new());
        broker.set_price("005930", 10_000, 0.0, 1_000);
        let state = state_with(vec![pick("005930", "상한가", "")]);
        let mut watcher = IntradayWatcher::new(Arc::clone(&broker) as _, state, config());

        watcher.poll_all_markets().await; // 워밍업

        // 1회차 충족 (Δ1.5%, 거래량 +50%) — confirm 1/2, 알림 없음
        broker.set_price("005930", 10_150, 1.5, 1_500);
        assert!(watcher.poll_all_markets().await.is_empty());

        // 2회차 연속 충족 — 알림 발생
        broker.set_price("005930", 10_400, 4.0, 2_300);
        let alerts = watcher.poll_all_markets().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::SurgeMomentum);
        assert!(alerts[0].delta_rate >= 1.0);
        assert!(alerts[0].momentary_strength >= 30.0);
    }

    #[tokio::test]
    async fn test_momentum_counter_resets_on_miss() {
        let broker = Arc::new(FakeBroker::new());
        broker.set_price("005930", 10_000, 0.0, 1_000);
        let state = state_with(vec![pick("005930", "상한가", "")]);
        let mut watcher = IntradayWatcher::new(Arc::clone(&broker) as _, state, config());

        watcher.poll_all_markets().await;

        broker.set_price("005930", 10_150, 1.5, 1_500); // 충족 1/2
        watcher.poll_all_markets().await;
        broker.set_price("005930", 10_160, 1.6, 1_510); // 미충족 → 리셋
        watcher.poll_all_markets().await;
        broker.set_price("005930", 10_300, 3.0, 2_300); // 충족 1/2
        let alerts = watcher.poll_all_markets().await;
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_bid_wall_alert() {
        let broker = Arc::new(FakeBroker::new());
        broker.set_price("005930", 10_000, 0.0, 1_000);
        broker.set_strong_orderbook("005930");
        let state = state_with(vec![pick("005930", "20%", "")]);
        let mut cfg = config();
        cfg.orderbook_enabled = true;
        let mut watcher = IntradayWatcher::new(Arc::clone(&broker) as _, state, cfg);

        watcher.poll_all_markets().await; // 워밍업

        // 등락률 4% ≥ min_change_rate, 강세 호가 → 매수벽
        broker.set_price("005930", 10_400, 4.0, 1_010);
        let alerts = watcher.poll_all_markets().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::BidWall);
        assert!(alerts[0].orderbook_analysis.is_some());
    }

    #[tokio::test]
    async fn test_alerts_scoped_to_watchlist() {
        // I4: 워치리스트 밖 종목은 가격이 있어도 절대 조회·알림되지 않는다
        let broker = Arc::new(FakeBroker::new());
        broker.set_price("005930", 70_000, 29.9, 1_000);
        broker.set_price("999999", 10_000, 29.9, 1_000);
        let state = state_with(vec![pick("005930", "상한가", "")]);
        let mut watcher = IntradayWatcher::new(Arc::clone(&broker) as _, state, config());

        watcher.poll_all_markets().await;
        let alerts = watcher.poll_all_markets().await;
        for alert in &alerts {
            assert_eq!(alert.stock_code, "005930");
        }
        // 종목당 사이클당 1회 조회 × 2사이클
        assert_eq!(broker.price_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_check_price_trigger_upper_limit() {
        let p = pick("005930", "상한가", "");
        assert_eq!(
            check_price_trigger(&p, 70_000, 29.5),
            Some(AlertType::PriceTarget)
        );
        assert_eq!(check_price_trigger(&p, 70_000, 10.0), None);
    }

    #[test]
    fn test_check_price_trigger_pct_stop() {
        let p = pick("005930", "20%", "-5%");
        assert_eq!(
            check_price_trigger(&p, 9_000, -5.2),
            Some(AlertType::PriceStop)
        );
        assert_eq!(check_price_trigger(&p, 9_900, -4.0), None);
    }
}
