//! 아침봇 최종 픽과 워치리스트 항목.

use serde::{Deserialize, Serialize};

use super::{CapTier, PickCategory, PickType};

/// 아침봇 3단계 출력의 픽 한 건.
///
/// 필드명 rename은 LLM JSON 계약(한국어 키)을 그대로 따른다.
/// `cap_tier`는 LLM 스키마에 없고 후처리에서 역매핑된다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    /// 매수 우선순위 (1 = 최우선)
    #[serde(rename = "순위", default)]
    pub rank: u32,
    /// 종목코드 (6자리, 빈 문자열 허용)
    #[serde(rename = "종목코드", default)]
    pub stock_code: String,
    /// 종목명
    #[serde(rename = "종목명", default)]
    pub stock_name: String,
    /// 선정 근거 (60자 이내)
    #[serde(rename = "근거", default)]
    pub reason: String,
    /// 픽 분류
    #[serde(rename = "유형", default)]
    pub category: PickCategory,
    /// 목표등락률 — "20%" 또는 "상한가"
    #[serde(rename = "목표등락률", default)]
    pub target_return: String,
    /// 손절기준 — 비율("-5%") 또는 가격("9,500원 하향 시")
    #[serde(rename = "손절기준", default)]
    pub stop_loss: String,
    /// 테마 여부
    #[serde(rename = "테마여부", default)]
    pub is_theme: bool,
    /// 매수 시점 안내
    #[serde(rename = "매수시점", default)]
    pub entry_window: String,
    /// 시총 구간 (후처리 주입)
    #[serde(default)]
    pub cap_tier: CapTier,
}

impl Pick {
    /// 청산 정책용 픽 타입 (공시·테마 ⇒ 당일 청산).
    pub fn pick_type(&self) -> PickType {
        self.category.pick_type()
    }

    /// 유효한 6자리 종목코드인지 확인.
    pub fn has_valid_code(&self) -> bool {
        self.stock_code.len() == 6 && self.stock_code.chars().all(|c| c.is_ascii_digit())
    }

    /// 목표등락률을 숫자(%)로 파싱. "상한가"는 None.
    pub fn target_pct(&self) -> Option<f64> {
        if self.target_return.contains("상한가") {
            return None;
        }
        let cleaned = self.target_return.replace('%', "").replace('+', "");
        cleaned.trim().parse::<f64>().ok().filter(|v| *v > 0.0)
    }
}

/// 워치리스트 항목 — 종목코드를 키로 하는 장중 감시 메타데이터.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEntry {
    /// 종목명
    pub name: String,
    /// 전일 거래량 (1 이상으로 클램프)
    pub prev_day_volume: i64,
    /// 우선순위 (픽 순위)
    pub priority: u32,
    /// 픽 분류
    pub category: PickCategory,
}

impl WatchEntry {
    /// 픽 + 전일 거래량에서 항목 생성. 거래량은 1 미만이면 1.
    pub fn from_pick(pick: &Pick, prev_day_volume: i64) -> Self {
        Self {
            name: pick.stock_name.clone(),
            prev_day_volume: prev_day_volume.max(1),
            priority: pick.rank,
            category: pick.category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pick() -> Pick {
        Pick {
            rank: 1,
            stock_code: "005930".to_string(),
            stock_name: "삼성전자".to_string(),
            reason: "DART 수주 320억(자기자본 28%)".to_string(),
            category: PickCategory::Filing,
            target_return: "20%".to_string(),
            stop_loss: "-5%".to_string(),
            is_theme: false,
            entry_window: "시초가 매수".to_string(),
            cap_tier: CapTier::Small3000,
        }
    }

    #[test]
    fn test_pick_type_from_category() {
        let mut pick = sample_pick();
        assert_eq!(pick.pick_type(), PickType::DayTrade);
        pick.category = PickCategory::Rotation;
        assert_eq!(pick.pick_type(), PickType::Swing);
    }

    #[test]
    fn test_target_pct() {
        let mut pick = sample_pick();
        assert_eq!(pick.target_pct(), Some(20.0));
        pick.target_return = "상한가".to_string();
        assert_eq!(pick.target_pct(), None);
        pick.target_return = "+15%".to_string();
        assert_eq!(pick.target_pct(), Some(15.0));
    }

    #[test]
    fn test_valid_code() {
        let mut pick = sample_pick();
        assert!(pick.has_valid_code());
        pick.stock_code = "".to_string();
        assert!(!pick.has_valid_code());
        pick.stock_code = "59A30".to_string();
        assert!(!pick.has_valid_code());
    }

    #[test]
    fn test_watch_entry_volume_clamp() {
        let pick = sample_pick();
        let entry = WatchEntry::from_pick(&pick, 0);
        assert_eq!(entry.prev_day_volume, 1);
        let entry = WatchEntry::from_pick(&pick, 123_456);
        assert_eq!(entry.prev_day_volume, 123_456);
    }

    #[test]
    fn test_pick_deserialize_korean_keys() {
        let json = r#"{
            "순위": 1, "종목명": "예시기업", "종목코드": "123456",
            "근거": "수주 공시", "유형": "공시",
            "목표등락률": "20%", "손절기준": "-5%",
            "테마여부": false, "매수시점": "시초가"
        }"#;
        let pick: Pick = serde_json::from_str(json).unwrap();
        assert_eq!(pick.category, PickCategory::Filing);
        assert_eq!(pick.cap_tier, CapTier::Unclassified);
        assert_eq!(pick.pick_type(), PickType::DayTrade);
    }
}
