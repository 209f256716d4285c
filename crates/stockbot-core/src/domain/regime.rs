//! 시장 환경 분류.
//!
//! 두 가지 어휘가 공존한다:
//! - [`RiskRegime`] — 아침봇 1단계(미국 증시 기반) 출력: 리스크온/오프/중립
//! - [`MarketRegime`] — KOSPI 등락률 기반 장중 환경: 강세장/약세장·횡보/횡보
//!
//! 포지션 한도와 트레일링 비율은 [`MarketRegime`]을 따른다.

use serde::{Deserialize, Serialize};

/// 아침봇 1단계 시장환경 판단 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RiskRegime {
    #[serde(rename = "리스크온")]
    RiskOn,
    #[serde(rename = "리스크오프")]
    RiskOff,
    #[serde(rename = "중립")]
    #[default]
    Neutral,
}

impl RiskRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskRegime::RiskOn => "리스크온",
            RiskRegime::RiskOff => "리스크오프",
            RiskRegime::Neutral => "중립",
        }
    }
}

impl std::fmt::Display for RiskRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// KOSPI 기반 장중 시장 환경.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MarketRegime {
    /// 강세장 (KOSPI +1% 이상)
    #[serde(rename = "강세장")]
    Bull,
    /// 약세장/횡보 (KOSPI -1% 이하)
    #[serde(rename = "약세장/횡보")]
    Bear,
    /// 횡보
    #[serde(rename = "횡보")]
    #[default]
    Sideways,
}

impl MarketRegime {
    /// KOSPI 등락률(%) → 환경. 경계값 ±1.0%는 각각 강세/약세에 포함.
    pub fn from_kospi_change(change_pct: f64) -> Self {
        if change_pct >= 1.0 {
            MarketRegime::Bull
        } else if change_pct <= -1.0 {
            MarketRegime::Bear
        } else {
            MarketRegime::Sideways
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::Bull => "강세장",
            MarketRegime::Bear => "약세장/횡보",
            MarketRegime::Sideways => "횡보",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "강세장" => MarketRegime::Bull,
            "약세장/횡보" | "약세장" => MarketRegime::Bear,
            _ => MarketRegime::Sideways,
        }
    }

    /// 트레일링 스톱 비율: 강세장에서만 느슨하게(0.92), 그 외 0.95.
    pub fn trailing_ratio(&self) -> f64 {
        match self {
            MarketRegime::Bull => 0.92,
            MarketRegime::Bear | MarketRegime::Sideways => 0.95,
        }
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regime_boundaries() {
        // 경계값 계약: 정확히 +1.0% → 강세장, 정확히 -1.0% → 약세장/횡보
        assert_eq!(MarketRegime::from_kospi_change(1.0), MarketRegime::Bull);
        assert_eq!(MarketRegime::from_kospi_change(-1.0), MarketRegime::Bear);
        assert_eq!(MarketRegime::from_kospi_change(0.99), MarketRegime::Sideways);
        assert_eq!(MarketRegime::from_kospi_change(-0.99), MarketRegime::Sideways);
        assert_eq!(MarketRegime::from_kospi_change(0.0), MarketRegime::Sideways);
    }

    #[test]
    fn test_trailing_ratio() {
        assert_eq!(MarketRegime::Bull.trailing_ratio(), 0.92);
        assert_eq!(MarketRegime::Bear.trailing_ratio(), 0.95);
        assert_eq!(MarketRegime::Sideways.trailing_ratio(), 0.95);
    }
}
