//! 봇 공통 에러 타입.

use thiserror::Error;

/// 핵심 봇 에러.
#[derive(Debug, Error)]
pub enum BotError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 브로커(KIS) 에러
    #[error("브로커 에러: {0}")]
    Broker(String),

    /// 수집기 에러
    #[error("수집 에러: {0}")]
    Collector(String),

    /// AI 분석 에러
    #[error("AI 분석 에러: {0}")]
    Analysis(String),

    /// 포지션 에러
    #[error("포지션 에러: {0}")]
    Position(String),

    /// 인증 에러
    #[error("인증 에러: {0}")]
    Auth(String),

    /// 요청 한도 초과
    #[error("요청 한도 초과: {0}")]
    RateLimit(String),

    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 데이터베이스 에러
    #[error("데이터베이스 에러: {0}")]
    Database(String),

    /// 알림 발송 에러
    #[error("알림 에러: {0}")]
    Notification(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 봇 작업을 위한 Result 타입.
pub type BotResult<T> = Result<T, BotError>;

impl BotError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BotError::Network(_) | BotError::RateLimit(_))
    }

    /// 치명적인 에러인지 확인합니다.
    ///
    /// DB 초기화 실패만 프로세스를 중단시킵니다 (그 외는 잡 단위 격리).
    pub fn is_critical(&self) -> bool {
        matches!(self, BotError::Database(_))
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(BotError::Network("timeout".to_string()).is_retryable());
        assert!(BotError::RateLimit("429".to_string()).is_retryable());
        assert!(!BotError::Auth("invalid key".to_string()).is_retryable());
    }

    #[test]
    fn test_error_critical() {
        assert!(BotError::Database("init 실패".to_string()).is_critical());
        assert!(!BotError::Collector("dart 수집 실패".to_string()).is_critical());
    }
}
