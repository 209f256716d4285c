//! 도메인 모델.
//!
//! 봇 전반에서 공유되는 타입들:
//! - 시총 구간 / 신호 유형 / 픽 분류 열거형
//! - 아침봇 픽과 워치리스트 항목
//! - 포지션·매매 이력·청산 사유
//! - 장중 알림 레코드

pub mod alert;
pub mod pick;
pub mod position;
pub mod regime;
pub mod signal;
pub mod tier;

pub use alert::*;
pub use pick::*;
pub use position::*;
pub use regime::*;
pub use signal::*;
pub use tier::*;
