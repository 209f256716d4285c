//! 브로커 인터페이스 공용 타입.

use serde::{Deserialize, Serialize};

/// 시장 구분.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    Kospi,
    Kosdaq,
}

impl Market {
    /// 순위 API용 FID_INPUT_ISCD 값.
    pub fn input_iscd(&self) -> &'static str {
        match self {
            Market::Kospi => "0001",
            Market::Kosdaq => "1001",
        }
    }

    pub fn label_kr(&self) -> &'static str {
        match self {
            Market::Kospi => "코스피",
            Market::Kosdaq => "코스닥",
        }
    }
}

/// 단일 종목 현재가.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockPrice {
    pub name: String,
    /// 현재가 (원)
    pub last: i64,
    /// 시가 (원)
    pub open: i64,
    /// 전일 대비 등락률 (%)
    pub change_pct: f64,
    /// 누적 거래량
    pub cum_volume: i64,
}

/// 호가 1단.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderbookLevel {
    pub price: i64,
    pub qty: i64,
}

/// 호가 10단 + 총잔량.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Orderbook {
    pub ticker: String,
    /// 매도호가 — asks[0]이 최저 매도가
    pub asks: Vec<OrderbookLevel>,
    /// 매수호가 — bids[0]이 최고 매수가
    pub bids: Vec<OrderbookLevel>,
    pub total_ask: i64,
    pub total_bid: i64,
}

impl Default for OrderbookLevel {
    fn default() -> Self {
        Self { price: 0, qty: 0 }
    }
}

/// 순위 API 1행 (거래량/등락률 공용).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedStock {
    pub code: String,
    pub name: String,
    /// 현재가 (원)
    pub price: i64,
    /// 등락률 (%)
    pub change_rate: f64,
    pub cum_volume: i64,
    /// 전일 거래량 (1 이상으로 클램프)
    pub prev_volume: i64,
    /// 시가총액 (억원, 0 = 미제공)
    pub market_cap_100m: i64,
}

/// 주문 결과 (매수/매도 공용).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub order_no: Option<String>,
    pub ticker: String,
    pub name: String,
    pub qty: i64,
    /// 매수 시점 현재가 (매수 주문만)
    pub buy_price: i64,
    /// 매도 시점 추정가 (매도 주문만)
    pub sell_price: i64,
    /// 추정 총액 (원)
    pub total_amount: i64,
    pub mode: String,
    pub message: String,
}

/// 보유 종목 1행.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub name: String,
    pub qty: i64,
    pub avg_price: f64,
    pub current_price: f64,
    pub profit_rate: f64,
}

/// 계좌 잔고.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Balance {
    pub holdings: Vec<Holding>,
    /// 매수 가능 금액 (원)
    pub available_cash: i64,
    /// 총 평가금액 (원)
    pub total_eval: i64,
    /// 총 손익률 (%)
    pub total_profit_pct: f64,
}

/// 실시간 체결 틱.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeTrade {
    pub code: String,
    /// 체결 시각 (HHMMSS)
    pub time: String,
    pub price: i64,
    /// 등락률 (%)
    pub change_rate: f64,
    pub cum_volume: i64,
}

/// 실시간 호가 틱.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeOrderbook {
    pub code: String,
    /// 호가 시각 (HHMMSS)
    pub time: String,
    pub asks: Vec<OrderbookLevel>,
    pub bids: Vec<OrderbookLevel>,
    pub total_ask: i64,
    pub total_bid: i64,
}

/// WebSocket 수신 이벤트.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    Trade(RealtimeTrade),
    Orderbook(RealtimeOrderbook),
    /// 연결 상태 변경
    Connected(bool),
    /// 재연결 한도 초과 — 장 마감으로 간주
    Exhausted,
}
