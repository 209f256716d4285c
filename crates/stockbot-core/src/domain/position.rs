//! 포지션과 매매 이력.

use serde::{Deserialize, Serialize};

use super::PickType;

/// 청산 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    #[serde(rename = "take_profit_1")]
    TakeProfit1,
    #[serde(rename = "take_profit_2")]
    TakeProfit2,
    #[serde(rename = "stop_loss")]
    StopLoss,
    #[serde(rename = "trailing_stop")]
    TrailingStop,
    #[serde(rename = "force_close")]
    ForceClose,
    #[serde(rename = "final_close")]
    FinalClose,
    #[serde(rename = "manual")]
    Manual,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::TakeProfit1 => "take_profit_1",
            CloseReason::TakeProfit2 => "take_profit_2",
            CloseReason::StopLoss => "stop_loss",
            CloseReason::TrailingStop => "trailing_stop",
            CloseReason::ForceClose => "force_close",
            CloseReason::FinalClose => "final_close",
            CloseReason::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "take_profit_1" => Some(CloseReason::TakeProfit1),
            "take_profit_2" => Some(CloseReason::TakeProfit2),
            "stop_loss" => Some(CloseReason::StopLoss),
            "trailing_stop" => Some(CloseReason::TrailingStop),
            "force_close" => Some(CloseReason::ForceClose),
            "final_close" => Some(CloseReason::FinalClose),
            "manual" => Some(CloseReason::Manual),
            _ => None,
        }
    }

    /// 승리로 집계되는 청산인지 (원칙 추출 기준).
    pub fn is_win(&self) -> bool {
        matches!(self, CloseReason::TakeProfit1 | CloseReason::TakeProfit2)
    }

    /// 청산 사유 한국어 표기 (일지 요약용).
    pub fn label_kr(&self) -> &'static str {
        match self {
            CloseReason::TakeProfit1 => "1차익절",
            CloseReason::TakeProfit2 => "2차익절",
            CloseReason::StopLoss => "손절",
            CloseReason::TrailingStop => "트레일링스탑",
            CloseReason::ForceClose => "강제청산",
            CloseReason::FinalClose => "최종청산",
            CloseReason::Manual => "수동청산",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 현재 오픈 포지션 (positions 테이블 1행).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    /// trading_history.id (1:1 대응)
    pub trading_id: i64,
    pub ticker: String,
    pub name: String,
    /// ISO 8601 KST
    pub buy_time: String,
    /// 매수가 (원)
    pub buy_price: i64,
    pub qty: i64,
    /// 진입 트리거 (volume / rate / websocket / gap_up)
    pub trigger_source: String,
    /// VTS / REAL
    pub mode: String,
    /// 청산 정책 (day_trade / swing)
    pub pick_type: PickType,
    /// 보유 중 최고가 — check_exit가 갱신
    pub peak_price: Option<i64>,
    /// 손절 가격 (원) — 픽 손절기준이 가격일 때만
    pub stop_loss_price: Option<i64>,
    /// 진입 시점 시장 환경 스냅샷
    pub market_env: String,
    /// 진입 시점 섹터 스냅샷
    pub sector: String,
}

/// 청산 완료된 거래 1건 (trading_history에서 sell_time이 채워진 행).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trading_id: i64,
    pub ticker: String,
    pub name: String,
    pub buy_time: String,
    pub sell_time: String,
    pub buy_price: i64,
    pub sell_price: i64,
    pub qty: i64,
    /// 수익률 (%, 소수 2자리)
    pub profit_rate: f64,
    /// 손익 금액 (원)
    pub profit_amount: i64,
    pub trigger_source: String,
    pub close_reason: CloseReason,
    pub mode: String,
    /// 진입 시점 시장 환경
    pub market_env: String,
}

impl ClosedTrade {
    /// 매도가·수량으로 수익률/손익 계산 (소수 2자리 반올림).
    pub fn pnl(buy_price: i64, sell_price: i64, qty: i64) -> (f64, i64) {
        if buy_price <= 0 {
            return (0.0, 0);
        }
        let rate = (sell_price - buy_price) as f64 / buy_price as f64 * 100.0;
        let rate = (rate * 100.0).round() / 100.0;
        (rate, (sell_price - buy_price) * qty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_roundtrip() {
        for r in [
            CloseReason::TakeProfit1,
            CloseReason::TakeProfit2,
            CloseReason::StopLoss,
            CloseReason::TrailingStop,
            CloseReason::ForceClose,
            CloseReason::FinalClose,
            CloseReason::Manual,
        ] {
            assert_eq!(CloseReason::parse(r.as_str()), Some(r));
        }
        assert_eq!(CloseReason::parse("unknown"), None);
    }

    #[test]
    fn test_win_classification() {
        assert!(CloseReason::TakeProfit1.is_win());
        assert!(CloseReason::TakeProfit2.is_win());
        assert!(!CloseReason::TrailingStop.is_win());
        assert!(!CloseReason::StopLoss.is_win());
    }

    #[test]
    fn test_pnl_rounding() {
        // 10,000 → 10,333: +3.33%
        let (rate, amount) = ClosedTrade::pnl(10_000, 10_333, 10);
        assert_eq!(rate, 3.33);
        assert_eq!(amount, 3_330);

        let (rate, amount) = ClosedTrade::pnl(0, 10_333, 10);
        assert_eq!(rate, 0.0);
        assert_eq!(amount, 0);
    }
}
