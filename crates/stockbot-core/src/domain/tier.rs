//! 시가총액 구간 (cap tier).
//!
//! RAG 패턴 저장·검색과 아침봇 후보 보강에서 공유하는 고정 열거형.
//! 과거에 모듈별로 명칭이 갈라져 RAG 검색이 영구 공집합이 되는 회귀가
//! 있었으므로, 문자열 표현은 반드시 이 타입을 경유한다.

use serde::{Deserialize, Serialize};

/// 300억 원.
const CAP_30B: i64 = 30_000_000_000;
/// 1000억 원.
const CAP_100B: i64 = 100_000_000_000;
/// 3000억 원.
const CAP_300B: i64 = 300_000_000_000;

/// 시가총액 구간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CapTier {
    /// 소형 — 시총 300억 미만
    #[serde(rename = "소형_300억미만")]
    Small300,
    /// 소형 — 시총 1000억 미만
    #[serde(rename = "소형_1000억미만")]
    Small1000,
    /// 소형 — 시총 3000억 미만
    #[serde(rename = "소형_3000억미만")]
    Small3000,
    /// 중형 — 시총 3000억 이상
    #[serde(rename = "중형")]
    Mid,
    /// 시총 정보 없음
    #[serde(rename = "미분류")]
    #[default]
    Unclassified,
}

impl CapTier {
    /// 시가총액(원) → 구간 변환.
    ///
    /// 0 이하(미조회)는 미분류.
    pub fn from_market_cap(cap: i64) -> Self {
        if cap <= 0 {
            CapTier::Unclassified
        } else if cap < CAP_30B {
            CapTier::Small300
        } else if cap < CAP_100B {
            CapTier::Small1000
        } else if cap < CAP_300B {
            CapTier::Small3000
        } else {
            CapTier::Mid
        }
    }

    /// DB·프롬프트용 문자열 표현.
    pub fn as_str(&self) -> &'static str {
        match self {
            CapTier::Small300 => "소형_300억미만",
            CapTier::Small1000 => "소형_1000억미만",
            CapTier::Small3000 => "소형_3000억미만",
            CapTier::Mid => "중형",
            CapTier::Unclassified => "미분류",
        }
    }

    /// DB 문자열 → 구간 (미지 값은 미분류).
    pub fn parse(s: &str) -> Self {
        match s {
            "소형_300억미만" => CapTier::Small300,
            "소형_1000억미만" => CapTier::Small1000,
            "소형_3000억미만" => CapTier::Small3000,
            "중형" => CapTier::Mid,
            _ => CapTier::Unclassified,
        }
    }
}

impl std::fmt::Display for CapTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
