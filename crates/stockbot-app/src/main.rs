//! StockBot 진입점.
//!
//! 환경 검증 → DB 초기화(실패 시 종료) → 컴포넌트 조립 → 스케줄 등록 →
//! 명령 봇 기동 → 종료 신호 대기.

mod collectors;
mod format;
mod handlers;
mod jobs;
mod scheduler;

use std::sync::Arc;

use chrono::Weekday;
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{info, warn};

use stockbot_analysis::{GeminiClient, MorningPipeline};
use stockbot_collector::{CacheSlot, DataCollector};
use stockbot_core::{
    AppConfig, LogConfig, LogFormat, MessageSink, NullSink, TradingCalendar, TradingMode,
    WatchlistState,
};
use stockbot_exchange::{
    Broker, KisBroker, KisConfig, KisDayProbe, KisEnvironment, RateLimiter,
};
use stockbot_execution::{PositionManager, TradeJournalHook};
use stockbot_notification::{CommandBot, TelegramConfig, TelegramSender};
use stockbot_tracking::{
    JournalRecorder, MemoryCompressor, PerformanceTracker, ThemeHistoryRecorder,
};
use stockbot_tracking::principles::PrinciplesExtractor;

use crate::collectors::{BrokerBackedCollectors, RankingCloseSource};
use crate::handlers::BotCommandHandlers;
use crate::jobs::AppContext;
use crate::scheduler::{CronEntry, Scheduler};

#[derive(Parser)]
#[command(name = "stockbot")]
#[command(about = "KRX 장중 자동매매 봇", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 로그 출력 형식 (pretty, json, compact) — 생략 시 LOG_FORMAT 환경 변수
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// 봇 실행 (기본)
    Run,
    /// DB 스키마만 초기화하고 종료
    InitDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 형식: --log-format > LOG_FORMAT 환경 변수 > pretty
    let log_format = cli
        .log_format
        .or_else(|| std::env::var("LOG_FORMAT").ok().and_then(|s| s.parse().ok()))
        .unwrap_or_default();
    stockbot_core::init_logging(LogConfig::new(cli.log_level.clone()).with_format(log_format))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    info!("========================================");
    info!("한국주식 봇 시작");
    info!("========================================");

    // 설정 로드 + 검증 (REAL 모드 필수 키 확인 포함)
    let config = AppConfig::from_env()?;
    info!(
        mode = %config.trading_mode,
        auto_trade = config.auto_trade_enabled,
        "설정 로드 완료"
    );

    // DB 초기화 — 유일한 치명적 실패 지점
    let pool = stockbot_data::open_pool(&config.db_path).await?;
    stockbot_data::init_db(&pool).await?;

    if matches!(cli.command, Some(Commands::InitDb)) {
        info!("DB 초기화 완료 — 종료");
        return Ok(());
    }

    // ── 브로커 게이트웨이 ─────────────────────────────────────
    let limiter = Arc::new(RateLimiter::for_mode(config.trading_mode));
    let environment = KisEnvironment::from_mode(config.trading_mode);
    let kis_broker = match config.active_credentials() {
        Some(creds) => KisBroker::new(
            KisConfig::from_credentials(creds, environment),
            Arc::clone(&limiter),
        )?,
        None => {
            anyhow::bail!(
                "활성 모드({})의 KIS 자격증명이 없습니다",
                config.trading_mode
            );
        }
    };
    let ws_oauth = config.watch.ws_enabled.then(|| kis_broker.oauth());
    let broker: Arc<dyn Broker> = Arc::new(kis_broker);

    // ── 공유 상태 ─────────────────────────────────────────────
    let state = Arc::new(WatchlistState::new());
    let cache_slot = Arc::new(CacheSlot::new());
    let calendar = TradingCalendar::new(Box::new(KisDayProbe::new(Arc::clone(&broker))));

    // ── 메시지 싱크 ───────────────────────────────────────────
    let (sink, telegram_config): (Arc<dyn MessageSink>, Option<TelegramConfig>) =
        match (&config.telegram_token, &config.telegram_chat_id) {
            (Some(token), Some(chat_id)) => {
                let tg_config = TelegramConfig::new(
                    SecretString::from(secrecy::ExposeSecret::expose_secret(token).to_string()),
                    chat_id.clone(),
                );
                (
                    Arc::new(TelegramSender::new(tg_config.clone())),
                    Some(tg_config),
                )
            }
            _ => {
                warn!("텔레그램 미설정 — 알림 발송 비활성");
                (Arc::new(NullSink), None)
            }
        };

    // ── AI 클라이언트 (없으면 중립 degrade) ───────────────────
    let llm = Arc::new(GeminiClient::new(config.google_ai_api_key.clone()));

    // ── 수집·분석·실행·학습 컴포넌트 ──────────────────────────
    let suite = Arc::new(BrokerBackedCollectors::new(Arc::clone(&broker)));
    let collector = DataCollector::new(
        suite,
        Arc::clone(&sink),
        Arc::clone(&cache_slot),
        config.collector_timeout_sec,
    );

    let pipeline = MorningPipeline::new(Arc::clone(&llm), pool.clone());

    // AI 유무와 무관하게 일지는 남긴다 (AI 없으면 규칙 태그만)
    let journal: Arc<dyn TradeJournalHook> =
        Arc::new(JournalRecorder::new(pool.clone(), Arc::clone(&llm)));

    let manager = Arc::new(PositionManager::new(
        pool.clone(),
        Arc::clone(&broker),
        Arc::clone(&state),
        config.position.clone(),
        config.trading_mode,
        config.auto_trade_enabled,
        journal,
    ));

    // 실전 모드 안전 확인 지연
    if config.trading_mode == TradingMode::Real && config.real_mode_confirm_enabled {
        manager.arm_real_mode_confirm(std::time::Duration::from_secs(
            config.real_mode_confirm_delay_sec,
        ));
    }

    let tracker = Arc::new(PerformanceTracker::new(
        pool.clone(),
        Arc::new(RankingCloseSource::new(Arc::clone(&broker))),
    ));
    let principles = PrinciplesExtractor::new(
        pool.clone(),
        JournalRecorder::new(pool.clone(), Arc::clone(&llm)),
    );
    let compressor = MemoryCompressor::new(
        pool.clone(),
        Arc::clone(&llm),
        config.memory_compress_enabled,
    );
    let theme_history = ThemeHistoryRecorder::new(pool.clone(), config.theme_history_enabled);

    let ctx = Arc::new(AppContext {
        config: config.clone(),
        pool: pool.clone(),
        calendar,
        broker: Arc::clone(&broker),
        state: Arc::clone(&state),
        cache_slot: Arc::clone(&cache_slot),
        collector,
        pipeline,
        manager: Arc::clone(&manager),
        tracker: Arc::clone(&tracker),
        principles,
        compressor,
        theme_history,
        sink: Arc::clone(&sink),
        ws_oauth,
        intraday_task: Mutex::new(None),
        ws_tasks: Mutex::new(Vec::new()),
    });

    // ── 스케줄 등록 ───────────────────────────────────────────
    let mut scheduler = Scheduler::new();

    macro_rules! register {
        ($entry:expr, $job:path) => {{
            let job_ctx = Arc::clone(&ctx);
            scheduler.add_job($entry, move || $job(Arc::clone(&job_ctx)));
        }};
    }

    register!(CronEntry::daily("data_collector", 6, 0), jobs::job_data_collector);
    register!(CronEntry::daily("morning_bot", 7, 30), jobs::job_morning_bot);
    register!(CronEntry::daily("rt_start", 9, 0), jobs::job_rt_start);
    register!(CronEntry::daily("force_close", 14, 50), jobs::job_force_close);
    register!(CronEntry::daily("final_close", 15, 20), jobs::job_final_close);
    register!(CronEntry::daily("rt_stop", 15, 30), jobs::job_rt_stop);
    register!(CronEntry::daily("perf_batch", 15, 45), jobs::job_perf_batch);
    register!(
        CronEntry::weekly("weekly_report", Weekday::Mon, 8, 30),
        jobs::job_weekly_report
    );
    register!(
        CronEntry::weekly("principles", Weekday::Sun, 3, 0),
        jobs::job_principles
    );
    register!(
        CronEntry::weekly("compression", Weekday::Sun, 3, 30),
        jobs::job_compression
    );

    let handles = scheduler.spawn_all();
    info!("스케줄 등록 완료");
    info!("  06:00 수집 / 07:30 아침봇 / 09:00~15:30 장중봇");
    info!("  14:50 강제청산 / 15:20 최종청산 / 15:45 수익률 추적");
    info!("  일 03:00 원칙 추출 / 일 03:30 기억 압축 / 월 08:30 주간 리포트");

    // ── 텔레그램 명령 봇 (롱폴링) ────────────────────────────
    if let Some(tg_config) = telegram_config {
        let handler = Arc::new(BotCommandHandlers {
            config: config.clone(),
            pool: pool.clone(),
            state: Arc::clone(&state),
            cache_slot: Arc::clone(&cache_slot),
            broker: Arc::clone(&broker),
            tracker: Arc::clone(&tracker),
        });
        let bot = CommandBot::new(tg_config, handler);
        tokio::spawn(async move { bot.run().await });
        info!("텔레그램 명령 봇 기동");
    }

    // ── 종료 대기 ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    info!("종료 신호 수신 — 봇 종료 중");

    // 장중 태스크가 남아 있으면 중단 (브로커 연결 누수 방지)
    jobs::job_rt_stop(Arc::clone(&ctx)).await;
    for handle in handles {
        handle.abort();
    }
    pool.close().await;
    info!("봇 종료");

    Ok(())
}
