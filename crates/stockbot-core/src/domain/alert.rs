//! 장중 알림 레코드.

use serde::{Deserialize, Serialize};

/// 감지 소스.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertSource {
    #[serde(rename = "volume")]
    Volume,
    #[serde(rename = "rate")]
    Rate,
    #[serde(rename = "websocket")]
    Websocket,
    #[serde(rename = "gap_up")]
    GapUp,
    #[serde(rename = "watchlist")]
    Watchlist,
}

impl AlertSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSource::Volume => "volume",
            AlertSource::Rate => "rate",
            AlertSource::Websocket => "websocket",
            AlertSource::GapUp => "gap_up",
            AlertSource::Watchlist => "watchlist",
        }
    }
}

impl std::fmt::Display for AlertSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 알림 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    /// 목표등락률 90% 이상 또는 상한가 인접(29.5%+) 도달
    #[serde(rename = "가격도달_목표")]
    PriceTarget,
    /// 손절 기준 도달
    #[serde(rename = "가격도달_손절")]
    PriceStop,
    /// 호가 강세 판정
    #[serde(rename = "매수벽")]
    BidWall,
    /// Δ등락률 + Δ거래량 연속 확인
    #[serde(rename = "급등모멘텀")]
    SurgeMomentum,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::PriceTarget => "가격도달_목표",
            AlertType::PriceStop => "가격도달_손절",
            AlertType::BidWall => "매수벽",
            AlertType::SurgeMomentum => "급등모멘텀",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 호가 강도.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderbookStrength {
    #[serde(rename = "강세")]
    Strong,
    #[serde(rename = "중립")]
    Neutral,
    #[serde(rename = "약세")]
    Weak,
}

impl OrderbookStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderbookStrength::Strong => "강세",
            OrderbookStrength::Neutral => "중립",
            OrderbookStrength::Weak => "약세",
        }
    }
}

impl std::fmt::Display for OrderbookStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 호가 분석 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookReport {
    /// 총매수잔량 / 총매도잔량
    pub bid_ask_ratio: f64,
    /// 매도호가 상위 3단 잔량 / 총매도잔량
    pub top3_ask_concentration: f64,
    /// 강세 / 중립 / 약세
    pub strength: OrderbookStrength,
    pub total_bid: i64,
    pub total_ask: i64,
}

/// 장중 감시 알림 1건 (출력 계약 고정).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntradayAlert {
    pub stock_code: String,
    pub stock_name: String,
    /// 현재가 (원)
    pub current_price: i64,
    /// 누적 등락률 (%)
    pub change_rate: f64,
    /// 직전 스냅샷 대비 추가 등락률 (%)
    pub delta_rate: f64,
    /// 거래량 배율
    pub volume_ratio: f64,
    /// 순간강도 (1분 거래량 증가율 %)
    pub momentary_strength: f64,
    /// 항상 true — 조건 충족 항목만 반환된다
    pub condition_met: bool,
    /// 감지 시각 (HH:MM:SS KST)
    pub detected_at: String,
    pub source: AlertSource,
    pub orderbook_analysis: Option<OrderbookReport>,
    /// 아침봇 픽 근거
    pub pick_reason: String,
    pub alert_type: AlertType,
}
