//! # StockBot Core
//!
//! 한국주식 자동매매 봇의 핵심 도메인 모델 및 공통 타입을 제공합니다.
//!
//! 이 크레이트는 봇 전반에서 사용되는 기본 타입을 제공합니다:
//! - KST 시계 및 거래일 캘린더
//! - 시총 구간 / 신호 유형 / 픽 분류 열거형
//! - 픽·포지션·알림 레코드
//! - 워치리스트 공유 상태
//! - 설정 관리
//! - 로깅 인프라

pub mod calendar;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod notify;
pub mod state;

pub use calendar::*;
pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use notify::*;
pub use state::*;
