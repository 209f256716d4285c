//! 텔레그램 발송기.
//!
//! - 텍스트는 HTML 파스 모드, 4096자 초과분은 분할해 0.5초 간격 순차 발송
//! - 사진은 PNG + 캡션(1024자 제한)
//! - 발송 실패는 에러로 돌려주되, 호출부 규칙상 항상 비치명적으로 다룬다

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, warn};

use stockbot_core::{BotResult, MessageSink};

use crate::types::{NotificationError, NotificationResult};

/// 텔레그램 메시지 최대 길이.
const MAX_MESSAGE_CHARS: usize = 4096;

/// 사진 캡션 최대 길이.
const MAX_CAPTION_CHARS: usize = 1024;

/// 분할 발송 간격.
const CHUNK_DELAY_MS: u64 = 500;

/// 텔레그램 설정.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub chat_id: String,
    pub enabled: bool,
    pub parse_mode: String,
    /// API 기본 URL 재정의 (테스트용)
    pub base_url: Option<String>,
}

impl TelegramConfig {
    pub fn new(bot_token: SecretString, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            enabled: true,
            parse_mode: "HTML".to_string(),
            base_url: None,
        }
    }

    fn api_url(&self, method: &str) -> String {
        let base = self
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.telegram.org".to_string());
        format!("{}/bot{}/{}", base, self.bot_token.expose_secret(), method)
    }
}

/// 긴 텍스트를 `max_chars` 이하 조각으로 분할한다 (줄 경계 우선).
pub fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        // 줄 경계에서 자르기 시도 (조각 절반 이상 유지될 때만)
        let slice: String = chars[start..end].iter().collect();
        let cut = if end < chars.len() {
            match slice.rfind('\n') {
                Some(pos) if pos >= max_chars / 2 => start + slice[..pos].chars().count() + 1,
                _ => end,
            }
        } else {
            end
        };
        let chunk: String = chars[start..cut.min(chars.len())].iter().collect();
        chunks.push(chunk.trim_end_matches('\n').to_string());
        start = cut;
    }
    chunks
}

/// 텔레그램 발송기.
pub struct TelegramSender {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramSender {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.chat_id.is_empty()
    }

    /// 단일 조각 발송.
    async fn send_chunk(&self, text: &str) -> NotificationResult<()> {
        let url = self.config.api_url("sendMessage");
        let params = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": self.config.parse_mode,
            "disable_web_page_preview": true,
        });

        debug!("텔레그램 발송 (chat_id: {})", self.config.chat_id);

        let response = self
            .client
            .post(&url)
            .json(&params)
            .send()
            .await
            .map_err(|e| NotificationError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                warn!("텔레그램 요청 한도 제한");
                return Err(NotificationError::RateLimited(60));
            }

            error!("텔레그램 발송 실패: {} - {}", status, body);
            Err(NotificationError::SendFailed(format!("HTTP {}: {}", status, body)))
        }
    }

    /// 텍스트 발송 — 4096자 초과분은 분할해 순차 발송.
    pub async fn send(&self, text: &str) -> NotificationResult<()> {
        if !self.is_enabled() {
            debug!("텔레그램 비활성 — 발송 건너뜀");
            return Ok(());
        }

        let chunks = chunk_message(text, MAX_MESSAGE_CHARS);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            self.send_chunk(chunk).await?;
            if i + 1 < total {
                tokio::time::sleep(Duration::from_millis(CHUNK_DELAY_MS)).await;
            }
        }
        if total > 1 {
            info!("텔레그램 분할 발송 완료 — {}조각", total);
        }
        Ok(())
    }

    /// 사진 + 캡션 발송.
    pub async fn send_png(&self, png: &[u8], caption: &str) -> NotificationResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let url = self.config.api_url("sendPhoto");
        let caption: String = caption.chars().take(MAX_CAPTION_CHARS).collect();

        let part = reqwest::multipart::Part::bytes(png.to_vec())
            .file_name("chart.png")
            .mime_str("image/png")
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.config.chat_id.clone())
            .text("caption", caption)
            .text("parse_mode", self.config.parse_mode.clone())
            .part("photo", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| NotificationError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(NotificationError::SendFailed(format!("HTTP {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl MessageSink for TelegramSender {
    async fn send_text(&self, text: &str) -> BotResult<()> {
        self.send(text).await.map_err(Into::into)
    }

    async fn send_photo(&self, png: &[u8], caption: &str) -> BotResult<()> {
        self.send_png(png, caption).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_base(base: &str) -> TelegramConfig {
        TelegramConfig {
            bot_token: SecretString::from("test-token".to_string()),
            chat_id: "12345".to_string(),
            enabled: true,
            parse_mode: "HTML".to_string(),
            base_url: Some(base.to_string()),
        }
    }

    #[test]
    fn test_chunk_short_message() {
        let chunks = chunk_message("짧은 메시지", 4096);
        assert_eq!(chunks, vec!["짧은 메시지"]);
    }

    #[test]
    fn test_chunk_long_message() {
        let long: String = "가".repeat(10_000);
        let chunks = chunk_message(&long, 4096);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 4096);
        }
        // 분할 후 내용 보존
        let rejoined: String = chunks.concat();
        assert_eq!(rejoined.chars().count(), 10_000);
    }

    #[test]
    fn test_chunk_prefers_line_boundary() {
        let mut text = String::new();
        for i in 0..100 {
            text.push_str(&format!("{}번째 줄입니다\n", i));
        }
        let chunks = chunk_message(&text, 500);
        // 줄 경계에서 잘렸다면 조각이 줄 중간에서 끊기지 않는다
        assert!(chunks[0].ends_with("줄입니다"));
    }

    #[tokio::test]
    async fn test_send_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bottest-token/sendMessage")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let sender = TelegramSender::new(config_with_base(&server.url()));
        sender.send("테스트 메시지").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_failure_is_error_not_panic() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bottest-token/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"Bad Request"}"#)
            .create_async()
            .await;

        let sender = TelegramSender::new(config_with_base(&server.url()));
        assert!(matches!(
            sender.send("메시지").await,
            Err(NotificationError::SendFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_sender_skips() {
        let mut config = config_with_base("http://unused.invalid");
        config.enabled = false;
        let sender = TelegramSender::new(config);
        // 비활성이면 네트워크 없이 Ok
        sender.send("메시지").await.unwrap();
    }
}
