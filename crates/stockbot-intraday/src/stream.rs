//! 선택적 WebSocket 틱 감시자.
//!
//! 픽 종목을 체결/호가 채널에 나눠 구독한다. 합산 구독 수는
//! `ws_watchlist_max`를 넘지 않는다 (초과분은 순위 낮은 픽부터 제외).
//! 틱 경로도 워치리스트 스코프를 지킨다 — 구독 목록 밖 코드가 수신돼도
//! 버린다. 종목당 WS 알림은 당일 1회다.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use stockbot_core::{
    now_kst, AlertSource, AlertType, IntradayAlert, Pick, WatchConfig, WatchlistState,
};
use stockbot_exchange::RealtimeEvent;

/// 추격 매수 방지 상한 (%) — 이 이상 오른 틱은 알림하지 않는다.
const MAX_CATCH_RATE: f64 = 25.0;

/// 구독 계획: (체결 채널, 호가 채널).
///
/// 호가 분석이 켜져 있으면 한도를 반씩 나누고, 꺼져 있으면 전부 체결에 쓴다.
pub fn plan_subscriptions(picks: &[Pick], config: &WatchConfig) -> (Vec<String>, Vec<String>) {
    let codes: Vec<String> = picks
        .iter()
        .filter(|p| p.has_valid_code())
        .map(|p| p.stock_code.clone())
        .collect();

    if config.orderbook_enabled {
        let half = config.ws_watchlist_max / 2;
        let trade: Vec<String> = codes.iter().take(half).cloned().collect();
        let orderbook: Vec<String> = codes.iter().take(half).cloned().collect();
        (trade, orderbook)
    } else {
        let trade: Vec<String> = codes
            .into_iter()
            .take(config.ws_watchlist_max)
            .collect();
        (trade, Vec::new())
    }
}

/// 틱 수신 → 알림 변환기.
pub struct TickWatcher {
    state: Arc<WatchlistState>,
    config: WatchConfig,
    /// WS 경로 전용 중복 방지 집합 (폴링 경로와 공유하지 않는다)
    alerted: HashSet<String>,
}

impl TickWatcher {
    pub fn new(state: Arc<WatchlistState>, config: WatchConfig) -> Self {
        Self {
            state,
            config,
            alerted: HashSet::new(),
        }
    }

    /// 체결 틱 1건 평가. 조건 미충족·스코프 밖·중복은 None.
    pub fn on_trade_tick(
        &mut self,
        code: &str,
        price: i64,
        change_rate: f64,
        cum_volume: i64,
    ) -> Option<IntradayAlert> {
        // 픽 워치리스트 외 종목 무시
        if !self.state.contains(code) {
            return None;
        }
        if change_rate < self.config.min_change_rate || change_rate > MAX_CATCH_RATE {
            return None;
        }
        if self.alerted.contains(code) {
            return None;
        }

        let picks = self.state.get_picks();
        let pick = picks.iter().find(|p| p.stock_code == code)?;
        let entry = self.state.get_watchlist().get(code).cloned()?;
        let volume_ratio = cum_volume as f64 / entry.prev_day_volume as f64;

        self.alerted.insert(code.to_string());

        Some(IntradayAlert {
            stock_code: code.to_string(),
            stock_name: pick.stock_name.clone(),
            current_price: price,
            change_rate,
            delta_rate: 0.0,
            volume_ratio: (volume_ratio * 100.0).round() / 100.0,
            momentary_strength: 0.0,
            condition_met: true,
            detected_at: now_kst().format("%H:%M:%S").to_string(),
            source: AlertSource::Websocket,
            orderbook_analysis: None,
            pick_reason: pick.reason.clone(),
            alert_type: AlertType::SurgeMomentum,
        })
    }

    /// 수신 루프 — 이벤트 채널을 소비해 알림 채널로 흘린다.
    ///
    /// [`RealtimeEvent::Exhausted`] 수신 시 장 마감으로 간주하고 종료.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<RealtimeEvent>,
        alerts: mpsc::Sender<IntradayAlert>,
    ) {
        info!("WebSocket 틱 감시 시작");
        while let Some(event) = events.recv().await {
            match event {
                RealtimeEvent::Trade(trade) => {
                    if let Some(alert) = self.on_trade_tick(
                        &trade.code,
                        trade.price,
                        trade.change_rate,
                        trade.cum_volume,
                    ) {
                        if alerts.send(alert).await.is_err() {
                            break;
                        }
                    }
                }
                RealtimeEvent::Orderbook(_) => {
                    // 호가 틱은 폴링 경로의 매수벽 판정과 중복되므로
                    // 현재는 수신만 하고 알림 트리거로 쓰지 않는다
                }
                RealtimeEvent::Connected(up) => {
                    debug!("WebSocket 연결 상태: {}", up);
                }
                RealtimeEvent::Exhausted => {
                    info!("재연결 한도 초과 — 틱 감시 종료 (장 마감 간주)");
                    break;
                }
            }
        }
        info!("WebSocket 틱 감시 종료");
    }
}
