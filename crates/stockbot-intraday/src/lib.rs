//! # StockBot Intraday
//!
//! 장중봇 — 아침봇 픽 전담 감시 (AI 없음, 숫자 조건만).
//!
//! 가장 중요한 불변식: 워치리스트(오늘의 픽) 밖 종목은 어떤 경로로도
//! 폴링·알림되지 않는다. REST 폴링과 WebSocket 틱 경로 모두 해당된다.
//!
//! - `orderbook`: 호가 잔량 → 강세/중립/약세 판정
//! - `watcher`: REST 폴링 감시 (워밍업 → 가격도달/급등모멘텀/매수벽)
//! - `stream`: 선택적 WebSocket 틱 감시 (구독 한도 분할)

pub mod orderbook;
pub mod stream;
pub mod watcher;

pub use orderbook::analyze_orderbook;
pub use stream::TickWatcher;
pub use watcher::IntradayWatcher;
