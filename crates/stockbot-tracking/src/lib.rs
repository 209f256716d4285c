//! # StockBot Tracking
//!
//! 청산 이후의 학습 루프.
//!
//! - `performance`: 15:45 배치 — 알림 1/3/7일 수익률 정산 + 주간 통계
//! - `rag`: 픽/미픽 결과를 패턴 DB에 누적 (다음 아침봇 ③단계 입력)
//! - `journal`: 청산 직후 매매 일지 기록 (규칙 태그 + 선택적 AI 회고)
//! - `principles`: 주간 원칙 추출 (일요일 03:00)
//! - `compressor`: 일지 3계층 압축 + KOSPI 레벨 통계 (일요일 03:30)
//! - `theme_history`: 이벤트→급등 섹터 이력 누적

pub mod compressor;
pub mod journal;
pub mod performance;
pub mod principles;
pub mod rag;
pub mod theme_history;

pub use compressor::MemoryCompressor;
pub use journal::JournalRecorder;
pub use performance::{ClosePriceSource, PerformanceTracker};
pub use principles::PrinciplesExtractor;
pub use rag::{DayOutcome, RagStore};
pub use theme_history::ThemeHistoryRecorder;
