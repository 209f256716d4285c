//! 텔레그램 명령 봇.
//!
//! getUpdates 롱폴링으로 명령을 수신하고 핸들러에 위임한다.
//! 핸들러 구현은 DB 조회(+선택적 AI 호출)만 허용된다 —
//! 주문 실행·상태 변경은 이 경로에서 금지다.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::telegram::TelegramConfig;
use crate::types::{NotificationError, NotificationResult};

/// 텔레그램 봇 업데이트 응답.
#[derive(Debug, Deserialize)]
struct TelegramUpdates {
    #[allow(dead_code)]
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

/// 개별 업데이트.
#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

/// 메시지 정보.
#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    text: Option<String>,
}

/// 채팅 정보.
#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

/// 봇 명령어.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// 스케줄러·워치리스트·캐시 상태
    Status,
    /// 보유 종목 현황
    Holdings,
    /// 매매 원칙 목록
    Principles,
    /// 주간 성과 리포트
    Report,
    /// 오늘 픽 평가 (현재가 대비)
    Evaluate,
    /// 도움말
    Help,
    /// 알 수 없는 명령어
    Unknown(String),
}

impl BotCommand {
    /// 텍스트에서 명령어 파싱.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if !text.starts_with('/') {
            return BotCommand::Unknown(text.to_string());
        }

        let command = text[1..]
            .split_whitespace()
            .next()
            .map(|s| s.to_lowercase());

        match command.as_deref() {
            Some("status") | Some("s") => BotCommand::Status,
            Some("holdings") | Some("h") => BotCommand::Holdings,
            Some("principles") | Some("p") => BotCommand::Principles,
            Some("report") | Some("r") => BotCommand::Report,
            Some("evaluate") | Some("e") => BotCommand::Evaluate,
            Some("help") | Some("start") => BotCommand::Help,
            _ => BotCommand::Unknown(text.to_string()),
        }
    }
}

/// 명령어 응답 (HTML 형식).
pub struct CommandResponse {
    pub text: String,
}

impl CommandResponse {
    pub fn html(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// 명령어 핸들러 — 구현체는 읽기 전용이어야 한다.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle_status(&self) -> NotificationResult<CommandResponse>;
    async fn handle_holdings(&self) -> NotificationResult<CommandResponse>;
    async fn handle_principles(&self) -> NotificationResult<CommandResponse>;
    async fn handle_report(&self) -> NotificationResult<CommandResponse>;
    async fn handle_evaluate(&self) -> NotificationResult<CommandResponse>;
}

/// 명령 봇 — 롱폴링 수신 루프.
pub struct CommandBot {
    config: TelegramConfig,
    client: reqwest::Client,
    handler: Arc<dyn CommandHandler>,
}

impl CommandBot {
    pub fn new(config: TelegramConfig, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            handler,
        }
    }

    /// 수신 루프. 취소될 때까지 돈다.
    pub async fn run(&self) {
        info!("텔레그램 명령 봇 시작");
        let mut offset: i64 = 0;

        loop {
            match self.poll_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.dispatch(update).await;
                    }
                }
                Err(e) => {
                    warn!("getUpdates 실패: {} — 5초 후 재시도", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn poll_updates(&self, offset: i64) -> NotificationResult<Vec<TelegramUpdate>> {
        let url = self.config.api_url_for("getUpdates");
        let response = self
            .client
            .get(&url)
            .query(&[("offset", offset.to_string()), ("timeout", "30".to_string())])
            .timeout(Duration::from_secs(40))
            .send()
            .await
            .map_err(|e| NotificationError::Network(e.to_string()))?;

        let updates: TelegramUpdates = response
            .json()
            .await
            .map_err(|e| NotificationError::Network(e.to_string()))?;
        Ok(updates.result)
    }

    async fn dispatch(&self, update: TelegramUpdate) {
        let Some(message) = update.message else { return };
        let Some(text) = message.text else { return };

        // 등록된 채팅 외 무시
        if message.chat.id.to_string() != self.config.chat_id {
            debug!("미등록 채팅 무시: {}", message.chat.id);
            return;
        }

        let command = BotCommand::parse(&text);
        debug!("명령 수신: {:?}", command);

        let response = match &command {
            BotCommand::Status => self.handler.handle_status().await,
            BotCommand::Holdings => self.handler.handle_holdings().await,
            BotCommand::Principles => self.handler.handle_principles().await,
            BotCommand::Report => self.handler.handle_report().await,
            BotCommand::Evaluate => self.handler.handle_evaluate().await,
            BotCommand::Help => Ok(CommandResponse::html(
                "<b>사용 가능한 명령어</b>\n\
                 /status — 봇 상태\n\
                 /holdings — 보유 종목\n\
                 /principles — 매매 원칙\n\
                 /report — 주간 리포트\n\
                 /evaluate — 오늘 픽 평가",
            )),
            BotCommand::Unknown(_) => return,
        };

        match response {
            Ok(resp) => {
                if let Err(e) = self.reply(&resp.text).await {
                    warn!("명령 응답 발송 실패 (비치명적): {}", e);
                }
            }
            Err(e) => {
                error!("명령 처리 실패: {}", e);
                let _ = self.reply(&format!("⚠️ 처리 실패: {}", e)).await;
            }
        }
    }

    async fn reply(&self, text: &str) -> NotificationResult<()> {
        let url = self.config.api_url_for("sendMessage");
        let params = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": self.config.parse_mode,
        });
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
            Err(NotificationError::SendFailed(format!(
                "HTTP {}",
                response.status()
            )))
        }
    }
}

impl TelegramConfig {
    /// commands 모듈용 URL 헬퍼 (telegram.rs와 동일 규칙).
    fn api_url_for(&self, method: &str) -> String {
        use secrecy::ExposeSecret;
        let base = self
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.telegram.org".to_string());
        format!("{}/bot{}/{}", base, self.bot_token.expose_secret(), method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(BotCommand::parse("/status"), BotCommand::Status);
        assert_eq!(BotCommand::parse("/s"), BotCommand::Status);
        assert_eq!(BotCommand::parse("/holdings"), BotCommand::Holdings);
        assert_eq!(BotCommand::parse("/principles"), BotCommand::Principles);
        assert_eq!(BotCommand::parse("/report"), BotCommand::Report);
        assert_eq!(BotCommand::parse("/evaluate"), BotCommand::Evaluate);
        assert_eq!(BotCommand::parse("/help"), BotCommand::Help);
        assert_eq!(BotCommand::parse("  /STATUS  "), BotCommand::Status);
        assert!(matches!(BotCommand::parse("/없는명령"), BotCommand::Unknown(_)));
        assert!(matches!(BotCommand::parse("일반 텍스트"), BotCommand::Unknown(_)));
    }
}
