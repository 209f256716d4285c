//! 알림 에러 타입.

use thiserror::Error;

/// 알림 발송 에러.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 발송 실패 (API 거부)
    #[error("발송 실패: {0}")]
    SendFailed(String),

    /// 요청 한도 제한 (재시도 대기 초)
    #[error("요청 한도 제한: {0}초 후 재시도")]
    RateLimited(u64),

    /// 비활성 상태
    #[error("알림 비활성")]
    Disabled,
}

pub type NotificationResult<T> = Result<T, NotificationError>;

impl From<NotificationError> for stockbot_core::BotError {
    fn from(err: NotificationError) -> Self {
        stockbot_core::BotError::Notification(err.to_string())
    }
}
