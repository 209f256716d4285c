//! KIS OAuth 토큰 발급·갱신.
//!
//! 토큰 수명 24시간. 만료 5분 전까지만 유효로 취급하며, 그 이후 호출은
//! 갱신을 시도한다. 갱신 실패는 캐시를 건드리지 않고 에러로 돌려준다.
//!
//! 모의/실전 토큰은 [`KisOAuth`] 인스턴스를 분리해 완전히 독립 관리한다 —
//! 한쪽 갱신이 다른 쪽을 무효화하지 않는다.

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::config::KisConfig;
use crate::error::{ExchangeError, ExchangeResult};

/// 토큰 유효 마진 (분) — 만료까지 이보다 적게 남으면 갱신 대상.
const TOKEN_VALID_MARGIN_MIN: i64 = 5;

/// 토큰 수명 (시간) — KIS 기본 만료.
const TOKEN_LIFETIME_HOURS: i64 = 24;

/// KIS OAuth 토큰 응답.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    #[serde(default)]
    token_type: String,
    #[allow(dead_code)]
    #[serde(default)]
    expires_in: i64,
}

/// KIS OAuth 에러 응답.
#[derive(Debug, Clone, Deserialize)]
struct OAuthErrorResponse {
    error_code: String,
    error_description: String,
}

/// 만료 추적이 포함된 토큰 상태.
#[derive(Debug, Clone)]
pub struct TokenState {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenState {
    /// 만료 5분 전까지만 유효.
    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at - Duration::minutes(TOKEN_VALID_MARGIN_MIN)
    }

    /// Authorization 헤더 값.
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// KIS WebSocket 접속 승인 응답.
#[derive(Debug, Clone, Deserialize)]
struct ApprovalResponse {
    approval_key: String,
}

/// 단일 환경(모의 또는 실전)의 토큰 캐시.
pub struct KisOAuth {
    config: KisConfig,
    client: Client,
    token: RwLock<Option<TokenState>>,
    websocket_key: RwLock<Option<String>>,
}

impl KisOAuth {
    pub fn new(config: KisConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::NetworkError(format!("HTTP client 생성 실패: {}", e)))?;

        Ok(Self {
            config,
            client,
            token: RwLock::new(None),
            websocket_key: RwLock::new(None),
        })
    }

    /// 유효한 접근 토큰 반환, 필요 시 갱신.
    pub async fn get_token(&self) -> ExchangeResult<String> {
        {
            let guard = self.token.read().await;
            if let Some(ref token) = *guard {
                if token.is_valid() {
                    debug!("캐시된 KIS 토큰 사용 (만료: {})", token.expires_at);
                    return Ok(token.access_token.clone());
                }
                warn!("KIS 토큰 만료 임박 (만료: {}) — 갱신", token.expires_at);
            }
        }

        self.refresh_token().await
    }

    /// 토큰 강제 갱신. 실패 시 캐시는 변경하지 않는다.
    pub async fn refresh_token(&self) -> ExchangeResult<String> {
        let label = self.config.environment.label();

        if self.config.app_key.is_empty() || self.config.app_secret_str().is_empty() {
            return Err(ExchangeError::Unauthorized(format!(
                "{} KIS 키 미설정 — 토큰 발급 불가",
                label
            )));
        }

        info!(
            "{} KIS 토큰 발급 요청 (AppKey: {}...)",
            label,
            self.config.app_key.chars().take(8).collect::<String>()
        );

        let url = format!("{}/oauth2/tokenP", self.config.rest_base_url());

        #[derive(Serialize)]
        struct TokenRequest<'a> {
            grant_type: &'a str,
            appkey: &'a str,
            appsecret: &'a str,
        }

        let body = TokenRequest {
            grant_type: "client_credentials",
            appkey: &self.config.app_key,
            appsecret: self.config.app_secret_str(),
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json; charset=utf-8")
            .json(&body)
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("{} 토큰 발급 실패: {} - {}", label, status, text);
            if let Ok(oauth_err) = serde_json::from_str::<OAuthErrorResponse>(&text) {
                return Err(ExchangeError::Unauthorized(format!(
                    "{} ({})",
                    oauth_err.error_description, oauth_err.error_code
                )));
            }
            return Err(ExchangeError::Unauthorized(format!(
                "토큰 발급 실패: {}",
                text
            )));
        }

        let token_resp: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| ExchangeError::ParseError(format!("토큰 응답 파싱 실패: {}", e)))?;

        let state = TokenState {
            access_token: token_resp.access_token,
            expires_at: Utc::now() + Duration::hours(TOKEN_LIFETIME_HOURS),
        };

        let access_token = state.access_token.clone();
        {
            let mut guard = self.token.write().await;
            *guard = Some(state);
        }

        info!("{} KIS 토큰 발급 완료", label);
        Ok(access_token)
    }

    /// WebSocket 접속 키 획득 (캐시 사용, 재연결 시 `clear_websocket_key`).
    pub async fn get_websocket_key(&self) -> ExchangeResult<String> {
        {
            let guard = self.websocket_key.read().await;
            if let Some(ref key) = *guard {
                return Ok(key.clone());
            }
        }

        info!("WebSocket 접속 키 발급 요청");

        let url = format!("{}/oauth2/Approval", self.config.rest_base_url());

        #[derive(Serialize)]
        struct ApprovalRequest<'a> {
            grant_type: &'a str,
            appkey: &'a str,
            secretkey: &'a str,
        }

        let body = ApprovalRequest {
            grant_type: "client_credentials",
            appkey: &self.config.app_key,
            secretkey: self.config.app_secret_str(),
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json; charset=utf-8")
            .json(&body)
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("WebSocket 접속 승인 실패: {} - {}", status, text);
            return Err(ExchangeError::ApiError {
                code: status.as_u16() as i32,
                message: text,
            });
        }

        let approval: ApprovalResponse = serde_json::from_str(&text)
            .map_err(|e| ExchangeError::ParseError(format!("접속 키 응답 파싱 실패: {}", e)))?;

        {
            let mut guard = self.websocket_key.write().await;
            *guard = Some(approval.approval_key.clone());
        }

        info!("WebSocket 접속 키 발급 완료");
        Ok(approval.approval_key)
    }

    /// WebSocket 키 초기화 (재연결 시 호출).
    pub async fn clear_websocket_key(&self) {
        let mut guard = self.websocket_key.write().await;
        *guard = None;
    }

    /// 유효한 토큰 보유 여부.
    pub async fn has_valid_token(&self) -> bool {
        let guard = self.token.read().await;
        guard.as_ref().map(|t| t.is_valid()).unwrap_or(false)
    }

    /// 현재 토큰 만료 시각.
    pub async fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        let guard = self.token.read().await;
        guard.as_ref().map(|t| t.expires_at)
    }

    pub fn config(&self) -> &KisConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config_with_base(base: &str, app_key: &str) -> KisConfig {
        KisConfig {
            environment: super::super::config::KisEnvironment::Paper,
            app_key: app_key.to_string(),
            app_secret: SecretString::from("secret-secret-secret".to_string()),
            account_no: "12345678".to_string(),
            account_code: "01".to_string(),
            timeout_secs: 5,
            rest_base_override: Some(base.to_string()),
        }
    }

    #[test]
    fn test_token_validity_window() {
        let token = TokenState {
            access_token: "abc".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        assert!(token.is_valid());

        // 만료 5분 미만 남음 → 무효
        let token = TokenState {
            access_token: "abc".to_string(),
            expires_at: Utc::now() + Duration::minutes(4),
        };
        assert!(!token.is_valid());
        assert_eq!(token.auth_header(), "Bearer abc");
    }

    #[tokio::test]
    async fn test_refresh_success_and_cache() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(r#"{"access_token":"tok-1","token_type":"Bearer","expires_in":86400}"#)
            .expect(1)
            .create_async()
            .await;

        let oauth = KisOAuth::new(config_with_base(&server.url(), "test-app-key")).unwrap();
        let token = oauth.get_token().await.unwrap();
        assert_eq!(token, "tok-1");
        assert!(oauth.has_valid_token().await);

        // 두 번째 호출은 캐시 사용 — mock expect(1) 검증
        let token = oauth.get_token().await.unwrap();
        assert_eq!(token, "tok-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_failure_leaves_cache_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/tokenP")
            .with_status(403)
            .with_body(r#"{"error_code":"EGW00103","error_description":"유효하지 않은 AppKey입니다."}"#)
            .create_async()
            .await;

        let oauth = KisOAuth::new(config_with_base(&server.url(), "bad-app-key")).unwrap();
        let result = oauth.get_token().await;
        assert!(matches!(result, Err(ExchangeError::Unauthorized(_))));
        assert!(!oauth.has_valid_token().await);
    }

    #[tokio::test]
    async fn test_paper_and_real_caches_are_independent() {
        let mut paper_server = mockito::Server::new_async().await;
        paper_server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(r#"{"access_token":"paper-tok","token_type":"Bearer","expires_in":86400}"#)
            .create_async()
            .await;

        let mut real_server = mockito::Server::new_async().await;
        real_server
            .mock("POST", "/oauth2/tokenP")
            .with_status(403)
            .with_body(r#"{"error_code":"EGW00103","error_description":"유효하지 않은 AppKey입니다."}"#)
            .create_async()
            .await;

        let paper = KisOAuth::new(config_with_base(&paper_server.url(), "paper-key")).unwrap();
        let real = KisOAuth::new(config_with_base(&real_server.url(), "real-key")).unwrap();

        assert!(paper.get_token().await.is_ok());
        assert!(real.get_token().await.is_err());

        // 실전 갱신 실패가 모의 캐시를 건드리지 않는다
        assert!(paper.has_valid_token().await);
        assert!(!real.has_valid_token().await);
    }
}
