//! 메시지 싱크 추상 인터페이스.
//!
//! 수집 요약·알림·청산 결과를 내보내는 유일한 출구.
//! 발송 실패는 항상 비치명적이어야 한다 — 호출부는 에러를 로깅만 하고
//! 다음 발송을 계속한다.

use async_trait::async_trait;

use crate::error::BotResult;

/// 텍스트/사진 발송 싱크.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// 텍스트 메시지 발송 (구현체가 길이 분할을 책임진다).
    async fn send_text(&self, text: &str) -> BotResult<()>;

    /// PNG 사진 + 캡션 발송.
    async fn send_photo(&self, png: &[u8], caption: &str) -> BotResult<()>;
}

/// 아무것도 보내지 않는 싱크 (테스트·비활성 모드용).
pub struct NullSink;

#[async_trait]
impl MessageSink for NullSink {
    async fn send_text(&self, _text: &str) -> BotResult<()> {
        Ok(())
    }

    async fn send_photo(&self, _png: &[u8], _caption: &str) -> BotResult<()> {
        Ok(())
    }
}
