//! 스케줄 잡 본문.
//!
//! 모든 장 운영일 잡은 본문 첫머리에서 캘린더 게이트를 지난다 —
//! 휴장일 발화는 관측 가능한 no-op다. 잡 내부 예외는 전부 잡 수준에서
//! 소화되고 다음 발화에 영향을 주지 않는다. 텔레그램 발송 실패는 항상
//! 비치명적이며, 한 건의 실패가 같은 잡의 다음 발송을 막지 않는다.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use stockbot_analysis::MorningPipeline;
use stockbot_collector::{CacheSlot, DailyCache, DataCollector};
use stockbot_core::{
    AppConfig, CapTier, MessageSink, SignalType, TradingCalendar, WatchlistState,
};
use stockbot_exchange::{Broker, KisOAuth, KisTickStream, Market};
use stockbot_execution::PositionManager;
use stockbot_intraday::stream::plan_subscriptions;
use stockbot_intraday::{IntradayWatcher, TickWatcher};
use stockbot_tracking::{
    DayOutcome, MemoryCompressor, PerformanceTracker, ThemeHistoryRecorder,
};
use stockbot_tracking::principles::PrinciplesExtractor;
use stockbot_tracking::theme_history::ClosingGainer;

use stockbot_data::alerts::AlertRepository;

use crate::format;

/// 상한가 인접 판정 기준 (%).
const UPPER_LIMIT_PCT: f64 = 29.5;

/// 잡들이 공유하는 애플리케이션 컨텍스트.
pub struct AppContext {
    pub config: AppConfig,
    pub pool: SqlitePool,
    pub calendar: TradingCalendar,
    pub broker: Arc<dyn Broker>,
    pub state: Arc<WatchlistState>,
    pub cache_slot: Arc<CacheSlot>,
    pub collector: DataCollector,
    pub pipeline: MorningPipeline,
    pub manager: Arc<PositionManager>,
    pub tracker: Arc<PerformanceTracker>,
    pub principles: PrinciplesExtractor,
    pub compressor: MemoryCompressor,
    pub theme_history: ThemeHistoryRecorder,
    pub sink: Arc<dyn MessageSink>,
    /// WebSocket 스트림용 토큰 캐시 (WS 비활성이면 None)
    pub ws_oauth: Option<Arc<KisOAuth>>,
    /// 장중봇 폴링 태스크 핸들 (rt_start가 채우고 rt_stop이 중단)
    pub intraday_task: Mutex<Option<JoinHandle<()>>>,
    /// WebSocket 태스크 핸들 (수신 루프 + 틱 감시)
    pub ws_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppContext {
    /// 발송 1건 — 실패는 로깅만 (비치명적).
    async fn send_safe(&self, text: &str) {
        if let Err(e) = self.sink.send_text(text).await {
            warn!("텔레그램 발송 실패 (비치명적): {}", e);
        }
    }

    async fn gate(&self, job: &str) -> bool {
        if self.calendar.is_trading_today().await {
            true
        } else {
            info!("휴장일 — {} 건너뜀", job);
            false
        }
    }
}

/// 06:00 — 데이터 수집 총괄.
pub async fn job_data_collector(ctx: Arc<AppContext>) {
    if !ctx.gate("데이터 수집").await {
        return;
    }
    ctx.collector.run().await;
}

/// 07:30 — 아침봇: 3단계 픽 생성 + 워치리스트 설정.
pub async fn job_morning_bot(ctx: Arc<AppContext>) {
    if !ctx.gate("아침봇").await {
        return;
    }

    // 전일 강제청산 구간 차단 해제 (새 거래일 준비)
    ctx.manager.unblock_new_entries();

    // 캐시가 신선하면 사용, 아니면 빈 캐시로 진행 (분석은 중립 degrade)
    let cache = if ctx.cache_slot.is_fresh(ctx.config.cache_max_age_min) {
        ctx.cache_slot.load().unwrap_or_default()
    } else {
        warn!("수집 캐시 없음/만료 — 빈 입력으로 아침봇 실행");
        DailyCache::default()
    };

    let result = ctx.pipeline.analyze(&cache).await;

    // 워치리스트·시장환경·섹터 맵 설정 (단일 작성자: 이 잡)
    if let Some(price_data) = &cache.price_data {
        ctx.state
            .set_kospi_snapshot(price_data.kospi.level, price_data.kospi.change_rate);
        ctx.state.set_sector_map(price_data.sector_map());
        ctx.state.set_picks(result.picks.clone(), &price_data.prev_volumes());
    } else {
        ctx.state
            .set_picks(result.picks.clone(), &Default::default());
    }

    ctx.send_safe(&format::format_morning_picks(&result.picks, &result.market_env))
        .await;
}

/// 09:00 — 장중봇 시작.
pub async fn job_rt_start(ctx: Arc<AppContext>) {
    if !ctx.gate("장중봇").await {
        return;
    }
    if !ctx.state.is_ready() {
        warn!("워치리스트 비어 있음 — 장중봇은 기동하되 알림 없음");
    }

    let mut guard = ctx.intraday_task.lock().await;
    if guard.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
        info!("장중봇 이미 실행 중 — start 무시");
        return;
    }

    let loop_ctx = Arc::clone(&ctx);
    let handle = tokio::spawn(async move {
        intraday_loop(loop_ctx).await;
    });
    *guard = Some(handle);
    drop(guard);

    // 선택적 WebSocket 틱 감시
    if ctx.config.watch.ws_enabled {
        if let Some(oauth) = &ctx.ws_oauth {
            let picks = ctx.state.get_picks();
            let (trade_codes, ob_codes) = plan_subscriptions(&picks, &ctx.config.watch);
            if !trade_codes.is_empty() {
                let (event_tx, event_rx) = tokio::sync::mpsc::channel(1_000);
                let (alert_tx, mut alert_rx) = tokio::sync::mpsc::channel(100);

                let stream = KisTickStream::new(Arc::clone(oauth), trade_codes, ob_codes);
                let stream_handle = tokio::spawn(async move {
                    if let Err(e) = stream.run(event_tx).await {
                        warn!("WebSocket 스트림 종료: {}", e);
                    }
                });

                let tick_watcher =
                    TickWatcher::new(Arc::clone(&ctx.state), ctx.config.watch.clone());
                let watcher_handle = tokio::spawn(async move {
                    tick_watcher.run(event_rx, alert_tx).await;
                });

                let dispatch_ctx = Arc::clone(&ctx);
                let dispatch_handle = tokio::spawn(async move {
                    let picks = dispatch_ctx.state.get_picks();
                    while let Some(alert) = alert_rx.recv().await {
                        if let Err(e) =
                            AlertRepository::record_alert(&dispatch_ctx.pool, &alert).await
                        {
                            warn!("WS 알림 DB 기록 실패 (비치명적): {}", e);
                        }
                        dispatch_ctx
                            .send_safe(&format::format_intraday_alert(&alert))
                            .await;
                        if let Some(pick) =
                            picks.iter().find(|p| p.stock_code == alert.stock_code)
                        {
                            dispatch_ctx.manager.try_enter(&alert, pick).await;
                        }
                    }
                });

                let mut ws_guard = ctx.ws_tasks.lock().await;
                ws_guard.extend([stream_handle, watcher_handle, dispatch_handle]);
                info!("WebSocket 틱 감시 기동");
            }
        }
    }

    info!(
        "장중봇 시작 — 폴링 간격 {}초 / 확인봉 {}회",
        ctx.config.watch.poll_interval_sec, ctx.config.watch.confirm_candles
    );
}

/// 장중 폴링 루프 본체 (rt_stop이 abort할 때까지).
async fn intraday_loop(ctx: Arc<AppContext>) {
    let mut watcher = IntradayWatcher::new(
        Arc::clone(&ctx.broker),
        Arc::clone(&ctx.state),
        ctx.config.watch.clone(),
    );
    let interval = std::time::Duration::from_secs(ctx.config.watch.poll_interval_sec);
    let picks = ctx.state.get_picks();
    let mut cycle: u64 = 0;

    loop {
        cycle += 1;
        let alerts = watcher.poll_all_markets().await;
        info!("폴링 사이클 #{} 완료 — 조건충족 {}건", cycle, alerts.len());

        for alert in &alerts {
            // ① 알림 기록 (+ 수익률 추적 행 예약)
            if let Err(e) = AlertRepository::record_alert(&ctx.pool, alert).await {
                warn!("알림 DB 기록 실패 (비치명적): {}", e);
            }
            // ② 텔레그램 발송
            ctx.send_safe(&format::format_intraday_alert(alert)).await;
            // ③ 자동매매 진입 시도
            if let Some(pick) = picks.iter().find(|p| p.stock_code == alert.stock_code) {
                if ctx.manager.try_enter(alert, pick).await.is_some() {
                    ctx.send_safe(&format!(
                        "🟢 <b>매수 체결</b> — {}({})",
                        alert.stock_name, alert.stock_code
                    ))
                    .await;
                }
            }
        }

        // ④ 매 사이클 청산 조건 검사
        for trade in ctx.manager.check_exit().await {
            ctx.send_safe(&format::format_closed_trade(&trade)).await;
        }

        tokio::time::sleep(interval).await;
    }
}

/// 14:50 — 강제 청산 (day_trade 픽만).
pub async fn job_force_close(ctx: Arc<AppContext>) {
    if !ctx.gate("강제청산").await {
        return;
    }
    for trade in ctx.manager.force_close_all().await {
        ctx.send_safe(&format::format_closed_trade(&trade)).await;
    }
}

/// 15:20 — 최종 청산 (남은 전부).
pub async fn job_final_close(ctx: Arc<AppContext>) {
    if !ctx.gate("최종청산").await {
        return;
    }
    for trade in ctx.manager.final_close_all().await {
        ctx.send_safe(&format::format_closed_trade(&trade)).await;
    }
}

/// 15:30 — 장중봇 종료.
pub async fn job_rt_stop(ctx: Arc<AppContext>) {
    let mut guard = ctx.intraday_task.lock().await;
    if let Some(handle) = guard.take() {
        handle.abort();
        let _ = handle.await;
        info!("장중봇 종료 완료");
    } else {
        info!("장중봇 미실행 — stop 무시");
    }
    drop(guard);

    // WebSocket 태스크 중단 (브로커 연결 누수 방지)
    let mut ws_guard = ctx.ws_tasks.lock().await;
    for handle in ws_guard.drain(..) {
        handle.abort();
        let _ = handle.await;
    }
}

/// 15:45 — 수익률 추적 배치 + RAG 누적.
pub async fn job_perf_batch(ctx: Arc<AppContext>) {
    if !ctx.gate("수익률 추적").await {
        return;
    }
    let outcomes = build_day_outcomes(&ctx).await;
    let result = ctx.tracker.run_batch(&outcomes).await;
    info!("수익률 추적 완료 — {}건 갱신", result.updated);

    // 테마 이력 누적 (비치명적)
    let gainers: Vec<ClosingGainer> = outcomes
        .iter()
        .filter(|o| o.max_return.unwrap_or(0.0) >= 15.0)
        .map(|o| ClosingGainer {
            ticker: o.code.clone(),
            name: o.name.clone(),
            change_pct: o.max_return.unwrap_or(0.0),
            sector: ctx.state.sector_of(&o.code).unwrap_or_default(),
        })
        .collect();
    let today = stockbot_core::today_kst().format("%Y%m%d").to_string();
    ctx.theme_history.record_closing(&today, &gainers).await;
}

/// 당일 급등 결과 수집 — 등락률 순위 기반 (RAG 결과 행의 원천).
async fn build_day_outcomes(ctx: &AppContext) -> Vec<DayOutcome> {
    let mut outcomes = Vec::new();
    for market in [Market::Kospi, Market::Kosdaq] {
        match ctx.broker.get_change_rank(market).await {
            Ok(rows) => {
                for row in rows {
                    outcomes.push(DayOutcome {
                        code: row.code.clone(),
                        name: row.name.clone(),
                        max_return: Some(row.change_rate),
                        hit_20pct: row.change_rate >= 20.0,
                        hit_upper: row.change_rate >= UPPER_LIMIT_PCT,
                        signal_type: SignalType::Unclassified,
                        cap_tier: CapTier::from_market_cap(row.market_cap_100m * 100_000_000),
                        memo: String::new(),
                    });
                }
            }
            Err(e) => warn!("{:?} 등락률 순위 조회 실패 (비치명적): {}", market, e),
        }
    }
    outcomes
}

/// 월요일 08:30 — 주간 리포트.
pub async fn job_weekly_report(ctx: Arc<AppContext>) {
    if !ctx.gate("주간 리포트").await {
        return;
    }
    let stats = ctx.tracker.get_weekly_stats().await;
    ctx.send_safe(&format::format_weekly_report(&stats)).await;
}

/// 일요일 03:00 — 매매 원칙 추출.
pub async fn job_principles(ctx: Arc<AppContext>) {
    let result = ctx.principles.run_weekly_extraction().await;
    info!(
        "원칙 추출 완료 — 신규:{} 갱신:{} 총:{}",
        result.inserted, result.updated, result.total_principles
    );
}

/// 일요일 03:30 — 기억 압축 + 지수 통계.
pub async fn job_compression(ctx: Arc<AppContext>) {
    let result = ctx.compressor.run_compression().await;
    info!(
        "기억 압축 완료 — L1→2:{} L2→3:{} 정리:{}",
        result.compressed_l1, result.compressed_l2, result.cleaned
    );
}
