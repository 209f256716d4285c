//! 수집 병렬 실행.
//!
//! 12개 수집기를 동시에 실행한다. 개별 수집기의 실패·타임아웃은
//! 해당 슬롯의 빈 값(+성공 플래그 false)으로 격리되고, 어떤 수집기도
//! 다른 수집기를 취소하지 못한다. 수집기당 벽시계 타임아웃이 걸려 있어
//! 전체 수집 시간은 최악 개별 타임아웃으로 유계다 (순차 연쇄 없음).

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use stockbot_core::{now_kst, previous_trading_day, today_kst, BotResult, MessageSink};

use crate::cache::{CacheSlot, DailyCache, COLLECTOR_NAMES};
use crate::contracts::{CollectorSuite, PriceData};
use crate::summary::format_raw_data_summary;

/// 수집 총괄.
pub struct DataCollector {
    suite: Arc<dyn CollectorSuite>,
    sink: Arc<dyn MessageSink>,
    slot: Arc<CacheSlot>,
    /// 수집기 개별 타임아웃
    timeout: Duration,
}

/// 실패·타임아웃을 빈 값으로 격리하는 공통 래퍼.
async fn guarded<T, F>(name: &str, timeout: Duration, fut: F) -> T
where
    T: Default,
    F: Future<Output = BotResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!("{} 수집 실패 (비치명적): {}", name, e);
            T::default()
        }
        Err(_) => {
            warn!("{} 수집 타임아웃 (비치명적)", name);
            T::default()
        }
    }
}

/// price_domestic 전용 래퍼 — 실패는 빈 값이 아니라 None.
async fn guarded_price<F>(timeout: Duration, fut: F) -> Option<PriceData>
where
    F: Future<Output = BotResult<PriceData>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("price_domestic 수집 실패 (비치명적): {}", e);
            None
        }
        Err(_) => {
            warn!("price_domestic 수집 타임아웃 (비치명적)");
            None
        }
    }
}

impl DataCollector {
    pub fn new(
        suite: Arc<dyn CollectorSuite>,
        sink: Arc<dyn MessageSink>,
        slot: Arc<CacheSlot>,
        timeout_sec: u64,
    ) -> Self {
        Self {
            suite,
            sink,
            slot,
            timeout: Duration::from_secs(timeout_sec),
        }
    }

    /// 06:00 스케줄 본체 — 병렬 수집 후 캐시 저장 + 요약 발송.
    pub async fn run(&self) -> DailyCache {
        self.run_for(today_kst()).await
    }

    /// 기준일을 지정한 수집 (테스트·수동 재실행용).
    pub async fn run_for(&self, today: chrono::NaiveDate) -> DailyCache {
        let prev = previous_trading_day(today);
        let prev_ymd = prev.map(|d| d.format("%Y%m%d").to_string());

        info!(
            "병렬 수집 시작 — 기준일: {}",
            prev_ymd.as_deref().unwrap_or("N/A")
        );
        let started = std::time::Instant::now();

        let t = self.timeout;
        let suite = &self.suite;

        let (
            dart_data,
            market_data,
            news_naver,
            news_newsapi,
            news_global_rss,
            price_data,
            sector_etf_data,
            short_data,
            event_calendar,
            closing_strength_result,
            volume_surge_result,
            fund_concentration_result,
        ) = tokio::join!(
            guarded("filings", t, async {
                match prev {
                    Some(p) => suite.filings(p).await,
                    None => Ok(Vec::new()),
                }
            }),
            guarded("market_global", t, async {
                match prev {
                    Some(p) => suite.market_global(p).await,
                    None => Ok(Default::default()),
                }
            }),
            guarded("news_naver", t, suite.news_naver(today)),
            guarded("news_newsapi", t, suite.news_newsapi(today)),
            guarded("news_global_rss", t, suite.news_global_rss()),
            guarded_price(t, async {
                match prev {
                    Some(p) => suite.price_domestic(p).await,
                    None => Err(stockbot_core::BotError::Collector(
                        "전 거래일 없음".to_string(),
                    )),
                }
            }),
            guarded("sector_etf", t, async {
                match prev {
                    Some(p) => suite.sector_etf(p).await,
                    None => Ok(Vec::new()),
                }
            }),
            guarded("short_interest", t, async {
                match prev {
                    Some(p) => suite.short_interest(p).await,
                    None => Ok(Vec::new()),
                }
            }),
            guarded("event_calendar", t, suite.event_calendar(today)),
            guarded("closing_strength", t, async {
                match &prev_ymd {
                    Some(d) => suite.closing_strength(d).await,
                    None => Ok(Vec::new()),
                }
            }),
            guarded("volume_surge", t, async {
                match &prev_ymd {
                    Some(d) => suite.volume_surge(d).await,
                    None => Ok(Vec::new()),
                }
            }),
            guarded("fund_concentration", t, async {
                match &prev_ymd {
                    Some(d) => suite.fund_concentration(d).await,
                    None => Ok(Vec::new()),
                }
            }),
        );

        info!("병렬 수집 완료 — {:.1}초", started.elapsed().as_secs_f64());

        // 성공 플래그: 빈 값도 실패로 기록한다 (운영자 육안 확인용)
        let mut success_flags = BTreeMap::new();
        let news_ok = |v: &Value| match v {
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            _ => false,
        };
        success_flags.insert("filings".to_string(), !dart_data.is_empty());
        success_flags.insert("market_global".to_string(), !market_data.is_empty());
        success_flags.insert("news_naver".to_string(), news_ok(&news_naver));
        success_flags.insert("news_newsapi".to_string(), news_ok(&news_newsapi));
        success_flags.insert("news_global_rss".to_string(), !news_global_rss.is_empty());
        success_flags.insert("price_domestic".to_string(), price_data.is_some());
        success_flags.insert("sector_etf".to_string(), !sector_etf_data.is_empty());
        success_flags.insert("short_interest".to_string(), !short_data.is_empty());
        success_flags.insert("event_calendar".to_string(), !event_calendar.is_empty());
        success_flags.insert(
            "closing_strength".to_string(),
            !closing_strength_result.is_empty(),
        );
        success_flags.insert("volume_surge".to_string(), !volume_surge_result.is_empty());
        success_flags.insert(
            "fund_concentration".to_string(),
            !fund_concentration_result.is_empty(),
        );

        let ok_count = success_flags.values().filter(|v| **v).count();
        info!(
            "수집 결과 — 성공:{} 실패:{}",
            ok_count,
            COLLECTOR_NAMES.len() - ok_count
        );
        for (name, ok) in &success_flags {
            if !ok {
                warn!("{} 수집 실패 (비치명적)", name);
            }
        }

        let cache = DailyCache {
            collected_at: now_kst().to_rfc3339_opts(chrono::SecondsFormat::Secs, false),
            dart_data,
            market_data,
            news_naver,
            news_newsapi,
            news_global_rss,
            price_data,
            sector_etf_data,
            short_data,
            event_calendar,
            closing_strength_result,
            volume_surge_result,
            fund_concentration_result,
            success_flags,
        };

        self.slot.store(cache.clone());
        info!("캐시 저장 완료");

        // 원시 데이터 요약 발송 — 실패는 비치명적
        let summary = format_raw_data_summary(&cache);
        if let Err(e) = self.sink.send_text(&summary).await {
            warn!("원시 데이터 텔레그램 발송 실패 (비치명적): {}", e);
        }

        cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::contracts::*;
    use stockbot_core::{BotError, BotResult};

    /// filings·price만 실패하는 수집기 묶음.
    struct PartiallyFailingSuite;

    #[async_trait]
    impl CollectorSuite for PartiallyFailingSuite {
        async fn filings(&self, _prev: NaiveDate) -> BotResult<Vec<FilingRecord>> {
            Err(BotError::Collector("DART 연결 실패".to_string()))
        }
        async fn market_global(&self, _prev: NaiveDate) -> BotResult<MarketSnapshot> {
            let mut snap = MarketSnapshot::default();
            snap.us_market.sectors.insert(
                "반도체".to_string(),
                SectorMove {
                    change: "+2.5%".to_string(),
                },
            );
            Ok(snap)
        }
        async fn news_naver(&self, _today: NaiveDate) -> BotResult<Value> {
            Ok(serde_json::json!([{"title": "뉴스"}]))
        }
        async fn news_newsapi(&self, _today: NaiveDate) -> BotResult<Value> {
            Ok(serde_json::json!({}))
        }
        async fn news_global_rss(&self) -> BotResult<Vec<Value>> {
            Ok(vec![])
        }
        async fn price_domestic(&self, _prev: NaiveDate) -> BotResult<PriceData> {
            Err(BotError::Collector("시세 조회 실패".to_string()))
        }
        async fn sector_etf(&self, _prev: NaiveDate) -> BotResult<Vec<SectorEtfFlow>> {
            Ok(vec![SectorEtfFlow::default()])
        }
        async fn short_interest(&self, _prev: NaiveDate) -> BotResult<Vec<ShortInterestRow>> {
            Ok(vec![ShortInterestRow::default()])
        }
        async fn event_calendar(&self, _today: NaiveDate) -> BotResult<Vec<Value>> {
            Ok(vec![])
        }
        async fn closing_strength(&self, _prev_ymd: &str) -> BotResult<Vec<StrengthRow>> {
            Ok(vec![StrengthRow::default()])
        }
        async fn volume_surge(&self, _prev_ymd: &str) -> BotResult<Vec<SurgeRow>> {
            Ok(vec![SurgeRow::default()])
        }
        async fn fund_concentration(&self, _prev_ymd: &str) -> BotResult<Vec<ConcentrationRow>> {
            Ok(vec![ConcentrationRow::default()])
        }
    }

    /// 발송이 실패하는 싱크.
    struct FailingSink {
        called: AtomicBool,
    }

    #[async_trait]
    impl MessageSink for FailingSink {
        async fn send_text(&self, _text: &str) -> BotResult<()> {
            self.called.store(true, Ordering::SeqCst);
            Err(BotError::Notification("telegram down".to_string()))
        }
        async fn send_photo(&self, _png: &[u8], _caption: &str) -> BotResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_partial_failure_isolated_and_flags_recorded() {
        let slot = Arc::new(CacheSlot::new());
        let sink = Arc::new(FailingSink {
            called: AtomicBool::new(false),
        });
        let collector = DataCollector::new(
            Arc::new(PartiallyFailingSuite),
            Arc::clone(&sink) as Arc<dyn MessageSink>,
            Arc::clone(&slot),
            5,
        );

        // 평일(수요일) 기준으로 실행 — 전 거래일 의존 수집기가 모두 동작한다
        let wednesday = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        let cache = collector.run_for(wednesday).await;

        // 실패 수집기는 빈 값 / None + 플래그 false
        assert!(cache.dart_data.is_empty());
        assert!(cache.price_data.is_none());
        assert_eq!(cache.success_flags["filings"], false);
        assert_eq!(cache.success_flags["price_domestic"], false);

        // 성공 수집기는 채워지고 플래그 true
        assert_eq!(cache.success_flags["market_global"], true);
        assert_eq!(cache.success_flags["sector_etf"], true);

        // 키 집합 불변식: 정확히 12개
        assert_eq!(cache.success_flags.len(), COLLECTOR_NAMES.len());
        for name in COLLECTOR_NAMES {
            assert!(cache.success_flags.contains_key(name), "{} 플래그 누락", name);
        }

        // 발송 실패는 비치명적 — 캐시는 저장됐다
        assert!(sink.called.load(Ordering::SeqCst));
        assert!(slot.load().is_some());
        assert!(!cache.collected_at.is_empty());
    }

    #[tokio::test]
    async fn test_rerun_overwrites_cleanly() {
        let slot = Arc::new(CacheSlot::new());
        let collector = DataCollector::new(
            Arc::new(PartiallyFailingSuite),
            Arc::new(stockbot_core::NullSink),
            Arc::clone(&slot),
            5,
        );

        let wednesday = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        let first = collector.run_for(wednesday).await;
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let second = collector.run_for(wednesday).await;

        // 두 번째 실행의 수집 시각이 더 뒤, 키 집합 동일
        assert!(second.collected_at > first.collected_at);
        assert_eq!(
            first.success_flags.keys().collect::<Vec<_>>(),
            second.success_flags.keys().collect::<Vec<_>>()
        );
        assert_eq!(slot.load().unwrap().collected_at, second.collected_at);
    }
}
