//! 픽 분류와 신호 유형.
//!
//! 아침봇 출력의 `유형`(픽 분류)과 RAG 저장용 `signal_type`은 다른 어휘다.
//! `공시`는 저장 직전 반드시 `DART_공시`로 정규화한다 — 원시 라벨 `공시`가
//! DB에 들어가면 유사패턴 검색이 깨진다.

use serde::{Deserialize, Serialize};

/// 아침봇 픽 분류 (LLM 출력 어휘).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PickCategory {
    /// DART 공시 재료
    #[serde(rename = "공시")]
    Filing,
    /// 테마 재료
    #[serde(rename = "테마")]
    Theme,
    /// 순환매 (전날 대장주 → 2등주 흐름)
    #[serde(rename = "순환매")]
    #[default]
    Rotation,
    /// 숏스퀴즈 (공매도 잔고 + 호재)
    #[serde(rename = "숏스퀴즈")]
    ShortSqueeze,
}

impl PickCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickCategory::Filing => "공시",
            PickCategory::Theme => "테마",
            PickCategory::Rotation => "순환매",
            PickCategory::ShortSqueeze => "숏스퀴즈",
        }
    }

    /// LLM 출력 문자열 → 분류. 미지 값은 None.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "공시" | "filing" => Some(PickCategory::Filing),
            "테마" | "theme" => Some(PickCategory::Theme),
            "순환매" | "rotation" => Some(PickCategory::Rotation),
            "숏스퀴즈" | "short_squeeze" => Some(PickCategory::ShortSqueeze),
            _ => None,
        }
    }

    /// RAG 저장용 신호 유형으로 정규화.
    pub fn signal_type(&self) -> SignalType {
        match self {
            PickCategory::Filing => SignalType::DartFiling,
            PickCategory::Theme => SignalType::Theme,
            PickCategory::Rotation => SignalType::Rotation,
            PickCategory::ShortSqueeze => SignalType::ShortSqueeze,
        }
    }

    /// 파생 픽 타입: 공시·테마는 당일 청산, 나머지는 스윙.
    pub fn pick_type(&self) -> PickType {
        match self {
            PickCategory::Filing | PickCategory::Theme => PickType::DayTrade,
            PickCategory::Rotation | PickCategory::ShortSqueeze => PickType::Swing,
        }
    }
}

impl std::fmt::Display for PickCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// RAG 패턴 저장·검색용 신호 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SignalType {
    #[serde(rename = "DART_공시")]
    DartFiling,
    #[serde(rename = "테마")]
    Theme,
    #[serde(rename = "순환매")]
    Rotation,
    #[serde(rename = "숏스퀴즈")]
    ShortSqueeze,
    #[serde(rename = "미분류")]
    #[default]
    Unclassified,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::DartFiling => "DART_공시",
            SignalType::Theme => "테마",
            SignalType::Rotation => "순환매",
            SignalType::ShortSqueeze => "숏스퀴즈",
            SignalType::Unclassified => "미분류",
        }
    }

    /// DB 문자열 → 신호 유형. 원시 라벨 `공시`도 정규화해서 받아준다.
    pub fn parse(s: &str) -> Self {
        match s {
            "DART_공시" | "공시" => SignalType::DartFiling,
            "테마" => SignalType::Theme,
            "순환매" => SignalType::Rotation,
            "숏스퀴즈" => SignalType::ShortSqueeze,
            _ => SignalType::Unclassified,
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 픽 타입 — 청산 정책을 결정한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PickType {
    /// 당일 청산 (14:50 강제청산 대상)
    #[serde(rename = "day_trade")]
    DayTrade,
    /// 오버나이트 허용 (15:20 최종청산까지 유지)
    #[serde(rename = "swing")]
    #[default]
    Swing,
}

impl PickType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickType::DayTrade => "day_trade",
            PickType::Swing => "swing",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "day_trade" => PickType::DayTrade,
            _ => PickType::Swing,
        }
    }
}

impl std::fmt::Display for PickType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filing_normalizes_to_dart() {
        // 회귀 가드: 공시 → DART_공시
        assert_eq!(PickCategory::Filing.signal_type(), SignalType::DartFiling);
        assert_eq!(PickCategory::Filing.signal_type().as_str(), "DART_공시");
        assert_eq!(SignalType::parse("공시"), SignalType::DartFiling);
    }

    #[test]
    fn test_pick_type_derivation() {
        assert_eq!(PickCategory::Filing.pick_type(), PickType::DayTrade);
        assert_eq!(PickCategory::Theme.pick_type(), PickType::DayTrade);
        assert_eq!(PickCategory::Rotation.pick_type(), PickType::Swing);
        assert_eq!(PickCategory::ShortSqueeze.pick_type(), PickType::Swing);
    }

    #[test]
    fn test_category_parse_both_vocabularies() {
        assert_eq!(PickCategory::parse("공시"), Some(PickCategory::Filing));
        assert_eq!(PickCategory::parse("filing"), Some(PickCategory::Filing));
        assert_eq!(PickCategory::parse("short_squeeze"), Some(PickCategory::ShortSqueeze));
        assert_eq!(PickCategory::parse("없는유형"), None);
    }
}
