//! 거래소 연동 에러 타입.

use thiserror::Error;

/// KIS 게이트웨이 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    NetworkError(String),

    /// 인증 실패 (토큰 발급/만료)
    #[error("인증 에러: {0}")]
    Unauthorized(String),

    /// KIS API 에러 응답
    #[error("KIS API 에러 [{code}]: {message}")]
    ApiError { code: i32, message: String },

    /// 응답 파싱 실패
    #[error("파싱 에러: {0}")]
    ParseError(String),

    /// 주문 거부
    #[error("주문 거부: {0}")]
    OrderRejected(String),

    /// WebSocket 에러
    #[error("WebSocket 에러: {0}")]
    WebSocket(String),
}

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

impl ExchangeError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::NetworkError(_) | ExchangeError::WebSocket(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ExchangeError::NetworkError("timeout".to_string()).is_retryable());
        assert!(!ExchangeError::Unauthorized("bad key".to_string()).is_retryable());
    }
}
