//! # StockBot Exchange
//!
//! 한국투자증권(KIS) 게이트웨이.
//!
//! - `rate_limiter`: 모드별(모의 2회/s, 실전 19회/s) 요청 한도
//! - `kis::auth`: OAuth 토큰 캐시 (모의/실전 완전 분리)
//! - `kis::quote`: 현재가·호가·거래량/등락률 순위
//! - `kis::order`: 시장가 매수/매도·잔고
//! - `kis::websocket`: 실시간 체결·호가 스트림
//! - `traits::Broker`: 코어가 소비하는 추상 인터페이스

pub mod error;
pub mod kis;
pub mod rate_limiter;
pub mod traits;
pub mod types;

pub use error::*;
pub use kis::{KisBroker, KisConfig, KisDayProbe, KisEnvironment, KisOAuth, KisTickStream};
pub use rate_limiter::RateLimiter;
pub use traits::Broker;
pub use types::*;
