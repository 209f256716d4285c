//! # StockBot Notification
//!
//! 텔레그램 발송 + 읽기 전용 명령 봇.
//!
//! - `telegram`: HTML 텍스트(4096자 분할)·사진 발송, [`stockbot_core::MessageSink`] 구현
//! - `commands`: getUpdates 롱폴링 명령 핸들러 (/status, /holdings,
//!   /principles, /report, /evaluate) — DB 조회 전용, 주문·상태 변경 금지

pub mod commands;
pub mod telegram;
pub mod types;

pub use commands::{BotCommand, CommandBot, CommandHandler, CommandResponse};
pub use telegram::{TelegramConfig, TelegramSender};
pub use types::NotificationError;
