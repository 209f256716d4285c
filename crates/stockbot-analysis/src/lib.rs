//! # StockBot Analysis
//!
//! 아침봇 3단계 AI 파이프라인.
//!
//! - `llm`: Gemini REST 클라이언트 (모델 폴백 + 관대한 JSON 추출)
//! - `morning`: ①시장환경 → ②재료검증(≤20) → ③최종픽(≤15, RAG 보강)
//!
//! 이 크레이트에서 텔레그램 발송·KIS 호출은 하지 않는다.

pub mod llm;
pub mod morning;

pub use llm::GeminiClient;
pub use morning::{CandidateSet, MarketEnvAnalysis, MorningPipeline, MorningResult};
