//! 호가 잔량 분석.

use tracing::debug;

use stockbot_core::{OrderbookReport, OrderbookStrength, WatchConfig};
use stockbot_exchange::Orderbook;

/// 호가 10단 → 매수/매도 강도 판정.
///
/// - 강세: 매수/매도 비율 ≥ `orderbook_bid_ask_good`,
///   또는 비율 ≥ `orderbook_bid_ask_min`이면서 매도 상위 3단 집중도 ≥
///   `orderbook_top3_ratio_min` (얇은 매도벽 돌파 기대)
/// - 약세: 비율 < 0.8
/// - 중립: 그 외
///
/// 총매도잔량이 0이면 판정 불가 → None.
pub fn analyze_orderbook(orderbook: &Orderbook, config: &WatchConfig) -> Option<OrderbookReport> {
    if orderbook.total_ask <= 0 {
        return None;
    }

    let bid_ask_ratio = orderbook.total_bid as f64 / orderbook.total_ask as f64;
    let top3_ask_qty: i64 = orderbook.asks.iter().take(3).map(|l| l.qty).sum();
    let top3_ask_concentration = top3_ask_qty as f64 / orderbook.total_ask as f64;

    let strength = if bid_ask_ratio >= config.orderbook_bid_ask_good {
        OrderbookStrength::Strong
    } else if bid_ask_ratio >= config.orderbook_bid_ask_min
        && top3_ask_concentration >= config.orderbook_top3_ratio_min
    {
        OrderbookStrength::Strong
    } else if bid_ask_ratio < 0.8 {
        OrderbookStrength::Weak
    } else {
        OrderbookStrength::Neutral
    };

    debug!(
        "호가 분석 — 매수매도비율={:.2} 매도상위3집중도={:.2} → {}",
        bid_ask_ratio, top3_ask_concentration, strength
    );

    Some(OrderbookReport {
        bid_ask_ratio: (bid_ask_ratio * 100.0).round() / 100.0,
        top3_ask_concentration: (top3_ask_concentration * 100.0).round() / 100.0,
        strength,
        total_bid: orderbook.total_bid,
        total_ask: orderbook.total_ask,
    })
}
