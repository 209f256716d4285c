//! 포지션 관리자.
//!
//! 진입 규칙:
//! - 자동매매 플래그 꺼짐 → 차단
//! - 진입 게이트 닫힘(강제청산 구간·실전 확인 지연) → 차단
//! - 이미 보유 → 차단 (재진입 금지)
//! - 동시 보유 한도: 강세장/약세장·횡보/그 외 각각 다른 상한
//! - 당일 실현 손실이 한도에 "도달"하면 차단 (등호 포함)
//!
//! 청산 평가는 엄격한 순서다: 2차 익절 → 1차 익절 → 트레일링 스톱 → 손절.
//! 트레일링은 이전 사이클에서 최고가가 기록된 포지션만 대상이다 —
//! 방금 연 포지션은 트레일링으로 청산되지 않는다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{info, warn};

use stockbot_core::{
    now_kst, today_kst, ClosedTrade, CloseReason, IntradayAlert, Pick, PickType, PositionConfig,
    TradingMode, WatchlistState,
};
use stockbot_data::trading::{OpenPositionInput, TradingRepository};
use stockbot_exchange::Broker;

/// 청산 직후 호출되는 일지 훅.
#[async_trait]
pub trait TradeJournalHook: Send + Sync {
    async fn on_close(&self, trade: &ClosedTrade);
}

/// 아무것도 기록하지 않는 훅.
pub struct NoopJournal;

#[async_trait]
impl TradeJournalHook for NoopJournal {
    async fn on_close(&self, _trade: &ClosedTrade) {}
}

/// 포지션 관리자.
pub struct PositionManager {
    pool: SqlitePool,
    broker: Arc<dyn Broker>,
    state: Arc<WatchlistState>,
    config: PositionConfig,
    mode: TradingMode,
    auto_trade_enabled: bool,
    journal: Arc<dyn TradeJournalHook>,
    /// 강제청산 구간(14:50~15:20) 신규 진입 차단
    entries_blocked: AtomicBool,
    /// 실전 모드 확인 지연 — 이 시각 전 매수 거부
    confirm_deadline: Mutex<Option<Instant>>,
}

impl PositionManager {
    pub fn new(
        pool: SqlitePool,
        broker: Arc<dyn Broker>,
        state: Arc<WatchlistState>,
        config: PositionConfig,
        mode: TradingMode,
        auto_trade_enabled: bool,
        journal: Arc<dyn TradeJournalHook>,
    ) -> Self {
        Self {
            pool,
            broker,
            state,
            config,
            mode,
            auto_trade_enabled,
            journal,
            entries_blocked: AtomicBool::new(false),
            confirm_deadline: Mutex::new(None),
        }
    }

    /// 실전 모드 안전 확인 지연 — 기동 후 `delay` 동안 매수를 거부한다.
    pub fn arm_real_mode_confirm(&self, delay: std::time::Duration) {
        *self.confirm_deadline.lock().unwrap() = Some(Instant::now() + delay);
        info!("실전 모드 확인 지연 활성 — {}초", delay.as_secs());
    }

    /// 신규 진입 차단 (14:50 강제청산 시작 시 호출).
    pub fn block_new_entries(&self) {
        self.entries_blocked.store(true, Ordering::SeqCst);
    }

    /// 신규 진입 차단 해제 (다음 거래일 준비).
    pub fn unblock_new_entries(&self) {
        self.entries_blocked.store(false, Ordering::SeqCst);
    }

    /// 현재 환경의 동시 보유 한도.
    fn position_cap(&self) -> i64 {
        use stockbot_core::MarketRegime;
        match self.state.market_env() {
            MarketRegime::Bull => self.config.max_bull,
            MarketRegime::Bear => self.config.max_bear,
            MarketRegime::Sideways => self.config.max_neutral,
        }
    }

    /// 매수 가능 여부 판단. (가능 여부, 사유)
    pub async fn can_buy(&self, ticker: &str) -> (bool, String) {
        if !self.auto_trade_enabled {
            return (false, "AUTO_TRADE_ENABLED=false".to_string());
        }

        if self.entries_blocked.load(Ordering::SeqCst) {
            return (false, "강제청산 구간 — 신규 진입 차단".to_string());
        }

        if let Some(deadline) = *self.confirm_deadline.lock().unwrap() {
            if Instant::now() < deadline {
                return (false, "실전 모드 확인 지연 중".to_string());
            }
        }

        let mode = self.mode.as_str();

        // ① 이미 보유 중인지
        match TradingRepository::is_held(&self.pool, mode, ticker).await {
            Ok(true) => return (false, format!("{} 이미 보유 중", ticker)),
            Ok(false) => {}
            Err(e) => {
                warn!("can_buy 보유 검사 오류 ({}): {}", ticker, e);
                return (false, format!("검사 오류: {}", e));
            }
        }

        // ② 동시 보유 한도 (시장 환경별)
        let cap = self.position_cap();
        match TradingRepository::count_open(&self.pool, mode).await {
            Ok(count) if count >= cap => {
                return (false, format!("동시 보유 한도 초과 ({}/{})", count, cap));
            }
            Ok(_) => {}
            Err(e) => return (false, format!("검사 오류: {}", e)),
        }

        // ③ 당일 손실 한도 — 도달(등호)도 차단
        let today = today_kst().format("%Y-%m-%d").to_string();
        let pnl_amount =
            match TradingRepository::today_realized_amount(&self.pool, mode, &today).await {
                Ok(v) => v,
                Err(e) => return (false, format!("검사 오류: {}", e)),
            };
        let invested = self.config.buy_amount * cap;
        let pnl_pct = if invested > 0 {
            pnl_amount as f64 / invested as f64 * 100.0
        } else {
            0.0
        };
        if pnl_pct <= self.config.daily_loss_limit {
            return (
                false,
                format!(
                    "당일 손실 한도 초과 ({:.1}% <= {}%)",
                    pnl_pct, self.config.daily_loss_limit
                ),
            );
        }

        (true, "OK".to_string())
    }

    /// 알림 → 매수 시도. 성공 시 포지션 id 반환.
    ///
    /// `can_buy` 통과 → 시장가 매수 → positions/trading_history 원자 기록.
    pub async fn try_enter(&self, alert: &IntradayAlert, pick: &Pick) -> Option<i64> {
        let (ok, reason) = self.can_buy(&alert.stock_code).await;
        if !ok {
            info!("{}({}) 매수 불가: {}", alert.stock_name, alert.stock_code, reason);
            return None;
        }

        let order = match self
            .broker
            .buy(&alert.stock_code, &alert.stock_name, self.config.buy_amount)
            .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!("{} 매수 주문 실패: {}", alert.stock_code, e);
                return None;
            }
        };
        if !order.success || order.qty <= 0 {
            warn!("{} 매수 거부: {}", alert.stock_code, order.message);
            return None;
        }

        let input = OpenPositionInput {
            ticker: alert.stock_code.clone(),
            name: alert.stock_name.clone(),
            buy_time: now_kst().to_rfc3339_opts(chrono::SecondsFormat::Secs, false),
            buy_price: order.buy_price,
            qty: order.qty,
            trigger_source: alert.source.as_str().to_string(),
            mode: self.mode.as_str().to_string(),
            pick_type: pick.pick_type(),
            stop_loss_price: parse_stop_price(&pick.stop_loss),
            market_env: self.state.market_context(),
            sector: self.state.sector_of(&alert.stock_code).unwrap_or_default(),
        };

        match TradingRepository::open_position(&self.pool, &input).await {
            Ok((position_id, _trading_id)) => Some(position_id),
            Err(e) => {
                warn!("{} 포지션 기록 실패: {}", alert.stock_code, e);
                None
            }
        }
    }

    /// 오픈 포지션 전체 청산 조건 검사 + 실행. 청산된 거래 목록 반환.
    pub async fn check_exit(&self) -> Vec<ClosedTrade> {
        let positions =
            match TradingRepository::open_positions(&self.pool, self.mode.as_str()).await {
                Ok(p) => p,
                Err(e) => {
                    warn!("check_exit 조회 실패: {}", e);
                    return Vec::new();
                }
            };

        let trailing_ratio = self.state.market_env().trailing_ratio();
        let mut closed = Vec::new();

        for position in positions {
            let current = match self.broker.get_price(&position.ticker).await {
                Ok(p) => p.last,
                Err(e) => {
                    warn!("{} 현재가 조회 실패: {}", position.ticker, e);
                    continue;
                }
            };
            if current <= 0 || position.buy_price <= 0 {
                continue;
            }

            // 최고가 갱신 — 트레일링 판정의 전제 조건
            let prior_peak = position.peak_price;
            let new_peak = prior_peak.unwrap_or(current).max(current);
            if prior_peak != Some(new_peak) {
                if let Err(e) =
                    TradingRepository::update_peak(&self.pool, position.id, new_peak).await
                {
                    warn!("{} 최고가 갱신 실패: {}", position.ticker, e);
                }
            }

            let profit_pct =
                (current - position.buy_price) as f64 / position.buy_price as f64 * 100.0;

            let reason = if profit_pct >= self.config.take_profit_2 {
                Some(CloseReason::TakeProfit2)
            } else if profit_pct >= self.config.take_profit_1 {
                Some(CloseReason::TakeProfit1)
            } else if prior_peak.is_some() && (current as f64) <= new_peak as f64 * trailing_ratio
            {
                Some(CloseReason::TrailingStop)
            } else if profit_pct <= self.config.stop_loss {
                Some(CloseReason::StopLoss)
            } else {
                None
            };

            let Some(reason) = reason else { continue };

            info!(
                "청산 조건 충족 — {}({}) 현재가 {}원 수익률 {:+.2}% 사유: {}",
                position.name, position.ticker, current, profit_pct, reason
            );

            if let Some(trade) = self.close_position(&position, reason).await {
                closed.push(trade);
            }
        }

        closed
    }

    /// 포지션 1건 청산 — 시장가 매도 후 DB 기록 + 일지 훅.
    async fn close_position(
        &self,
        position: &stockbot_core::Position,
        reason: CloseReason,
    ) -> Option<ClosedTrade> {
        let order = match self
            .broker
            .sell(&position.ticker, &position.name, position.qty)
            .await
        {
            Ok(o) => o,
            Err(e) => {
                warn!("{} 매도 주문 실패 ({}): {}", position.ticker, reason, e);
                return None;
            }
        };
        if !order.success {
            warn!(
                "{}({}) 매도 실패 ({}): {}",
                position.name, position.ticker, reason, order.message
            );
            return None;
        }

        let sell_price = if order.sell_price > 0 {
            order.sell_price
        } else {
            position.buy_price
        };
        let sell_time = now_kst().to_rfc3339_opts(chrono::SecondsFormat::Secs, false);

        let trade = match TradingRepository::close_position(
            &self.pool, position, &sell_time, sell_price, reason,
        )
        .await
        {
            Ok(t) => t,
            Err(e) => {
                warn!("{} DB 청산 기록 실패: {}", position.ticker, e);
                return None;
            }
        };

        self.journal.on_close(&trade).await;
        Some(trade)
    }

    /// 14:50 강제 청산 — 당일 청산(day_trade) 픽만 시장가 매도.
    pub async fn force_close_all(&self) -> Vec<ClosedTrade> {
        if !self.auto_trade_enabled {
            return Vec::new();
        }
        self.block_new_entries();

        let positions =
            match TradingRepository::open_positions(&self.pool, self.mode.as_str()).await {
                Ok(p) => p,
                Err(e) => {
                    warn!("force_close_all 조회 실패: {}", e);
                    return Vec::new();
                }
            };

        let targets: Vec<_> = positions
            .into_iter()
            .filter(|p| p.pick_type == PickType::DayTrade)
            .collect();

        if targets.is_empty() {
            info!("강제 청산 대상 없음");
            return Vec::new();
        }

        info!("강제 청산 시작 — {}종목", targets.len());
        let mut closed = Vec::new();
        for position in &targets {
            if let Some(trade) = self.close_position(position, CloseReason::ForceClose).await {
                closed.push(trade);
            }
        }
        closed
    }

    /// 15:20 최종 청산 — 남은 포지션 전부 (스윙 포함).
    pub async fn final_close_all(&self) -> Vec<ClosedTrade> {
        if !self.auto_trade_enabled {
            return Vec::new();
        }

        let positions =
            match TradingRepository::open_positions(&self.pool, self.mode.as_str()).await {
                Ok(p) => p,
                Err(e) => {
                    warn!("final_close_all 조회 실패: {}", e);
                    return Vec::new();
                }
            };

        if positions.is_empty() {
            info!("최종 청산 대상 없음");
            return Vec::new();
        }

        info!("최종 청산 시작 — {}종목", positions.len());
        let mut closed = Vec::new();
        for position in &positions {
            if let Some(trade) = self.close_position(position, CloseReason::FinalClose).await {
                closed.push(trade);
            }
        }
        closed
    }

    /// 오픈 포지션 목록 (상태 조회용).
    pub async fn open_positions(&self) -> Vec<stockbot_core::Position> {
        TradingRepository::open_positions(&self.pool, self.mode.as_str())
            .await
            .unwrap_or_default()
    }
}

/// 픽 손절기준에서 가격(원)을 추출한다. 비율 표기는 None.
fn parse_stop_price(stop: &str) -> Option<i64> {
    if !stop.contains('원') {
        return None;
    }
    let price_part = stop.split('원').next()?;
    let digits: String = price_part
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .collect::<String>()
        .chars()
        .rev()
        .collect();
    digits.replace(',', "").parse::<i64>().ok().filter(|v| *v > 0)
}
