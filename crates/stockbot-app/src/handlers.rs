//! 텔레그램 명령 핸들러 구현.
//!
//! 전부 읽기 전용이다 — DB 조회 + 브로커 시세/잔고 조회만.
//! 이 경로에서 주문·상태 변경은 금지.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;

use stockbot_core::{now_kst, today_kst, AppConfig, WatchlistState};
use stockbot_data::picks::PickRepository;
use stockbot_data::principles::PrincipleRepository;
use stockbot_exchange::Broker;
use stockbot_notification::{CommandHandler, CommandResponse};
use stockbot_notification::types::{NotificationError, NotificationResult};
use stockbot_tracking::PerformanceTracker;

use stockbot_collector::CacheSlot;

use crate::format;

/// 봇 상태·DB를 읽는 명령 핸들러.
pub struct BotCommandHandlers {
    pub config: AppConfig,
    pub pool: SqlitePool,
    pub state: Arc<WatchlistState>,
    pub cache_slot: Arc<CacheSlot>,
    pub broker: Arc<dyn Broker>,
    pub tracker: Arc<PerformanceTracker>,
}

#[async_trait]
impl CommandHandler for BotCommandHandlers {
    async fn handle_status(&self) -> NotificationResult<CommandResponse> {
        let watchlist = self.state.get_watchlist();
        let cache_state = if self.cache_slot.is_fresh(self.config.cache_max_age_min) {
            "신선"
        } else if self.cache_slot.load().is_some() {
            "만료"
        } else {
            "없음"
        };

        Ok(CommandResponse::html(format!(
            "🤖 <b>봇 상태</b>\n\
             모드: {} / 자동매매: {}\n\
             워치리스트: {}종목 / 시장환경: {}\n\
             수집 캐시: {}\n\
             <i>🕐 {}</i>",
            self.config.trading_mode,
            if self.config.auto_trade_enabled { "ON" } else { "OFF" },
            watchlist.len(),
            self.state.market_env(),
            cache_state,
            now_kst().format("%Y-%m-%d %H:%M:%S"),
        )))
    }

    async fn handle_holdings(&self) -> NotificationResult<CommandResponse> {
        let balance = self
            .broker
            .get_balance()
            .await
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;
        Ok(CommandResponse::html(format::format_balance(&balance)))
    }

    async fn handle_principles(&self) -> NotificationResult<CommandResponse> {
        let rows = PrincipleRepository::top(&self.pool, 10)
            .await
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        if rows.is_empty() {
            return Ok(CommandResponse::html("📏 아직 추출된 원칙이 없습니다."));
        }

        let mut lines = vec!["📏 <b>매매 원칙</b>".to_string()];
        for row in rows {
            lines.push(format!(
                "  [{}] {} — 승률 {:.1}% ({}/{})",
                row.confidence,
                row.condition_desc.as_deref().unwrap_or(""),
                row.win_rate,
                row.win_count,
                row.total_count,
            ));
        }
        Ok(CommandResponse::html(lines.join("\n")))
    }

    async fn handle_report(&self) -> NotificationResult<CommandResponse> {
        let stats = self.tracker.get_weekly_stats().await;
        Ok(CommandResponse::html(format::format_weekly_report(&stats)))
    }

    async fn handle_evaluate(&self) -> NotificationResult<CommandResponse> {
        let today = today_kst().format("%Y%m%d").to_string();
        let picks = PickRepository::load_for_date(&self.pool, &today)
            .await
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        if picks.is_empty() {
            return Ok(CommandResponse::html("📊 오늘 저장된 픽이 없습니다."));
        }

        let mut lines = vec![format!("📊 <b>오늘 픽 평가</b> ({})", today)];
        for pick in &picks {
            match self.broker.get_price(&pick.stock_code).await {
                Ok(price) => lines.push(format!(
                    "  {}. {} {:+.1}% (목표 {})",
                    pick.rank, pick.stock_name, price.change_pct, pick.target_rate
                )),
                Err(_) => lines.push(format!(
                    "  {}. {} 시세 조회 실패 (목표 {})",
                    pick.rank, pick.stock_name, pick.target_rate
                )),
            }
        }
        Ok(CommandResponse::html(lines.join("\n")))
    }
}
