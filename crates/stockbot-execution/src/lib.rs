//! # StockBot Execution
//!
//! 포지션 관리 — 진입 허가, 단계별 청산, 강제 청산.
//!
//! 이 크레이트는 포지션 관리·주문 연동만 담당한다.
//! 급등 감지·AI 분석·알림 포맷 생성은 하지 않는다.

pub mod manager;

pub use manager::{NoopJournal, PositionManager, TradeJournalHook};
