//! KST 시계와 거래일 캘린더.
//!
//! - 주말은 외부 조회 없이 휴장 처리
//! - 평일 공휴일은 외부 프로브(일별 시세 존재 여부)로 확인
//! - 프로브 결과는 YYYYMMDD 키로 프로세스 수명 동안 캐시 (동일 날짜 재프로브 없음)
//! - 프로브 실패 시 거래일로 간주 (fail-open — 하위 잡이 다시 게이트한다)

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Asia::Seoul;
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::BotResult;

/// KST 현재 시각.
pub fn now_kst() -> DateTime<Tz> {
    Utc::now().with_timezone(&Seoul)
}

/// KST 오늘 날짜.
pub fn today_kst() -> NaiveDate {
    now_kst().date_naive()
}

/// KST 현재 시각 ISO 8601 (+09:00 오프셋 포함).
pub fn now_kst_iso() -> String {
    now_kst().to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

/// 날짜 → YYYYMMDD 문자열.
pub fn fmt_ymd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// 전 거래일 계산.
///
/// 월요일 → 금요일(-3일), 화~금 → 전날(-1일), 토/일 → None.
/// 공휴일은 여기서 고려하지 않는다.
pub fn previous_trading_day(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Mon => Some(date - Duration::days(3)),
        Weekday::Tue | Weekday::Wed | Weekday::Thu | Weekday::Fri => {
            Some(date - Duration::days(1))
        }
        Weekday::Sat | Weekday::Sun => None,
    }
}

/// 평일 공휴일 판정용 외부 프로브.
///
/// 구현체는 해당 날짜에 시세 데이터가 존재하는지만 답한다.
#[async_trait]
pub trait DayProbe: Send + Sync {
    /// 해당 날짜에 거래 데이터가 있으면 true.
    async fn has_trading_data(&self, date: NaiveDate) -> BotResult<bool>;
}

/// 거래일 캘린더 — 프로브 결과를 YYYYMMDD 키로 캐시한다.
pub struct TradingCalendar {
    probe: Box<dyn DayProbe>,
    /// {YYYYMMDD: 거래일 여부} — 프로세스 수명 캐시
    cache: Mutex<HashMap<String, bool>>,
}

impl TradingCalendar {
    pub fn new(probe: Box<dyn DayProbe>) -> Self {
        Self {
            probe,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 거래일 여부.
    ///
    /// 주말은 프로브 없이 false. 평일은 프로브 1회 후 캐시.
    /// 프로브 실패는 true (fail-open).
    pub async fn is_trading_day(&self, date: NaiveDate) -> bool {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            debug!("주말({}) — 휴장", date.weekday());
            return false;
        }

        let key = fmt_ymd(date);

        // 캐시를 잡은 채로 프로브까지 수행 — 동일 날짜 중복 프로브 방지
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(&key) {
            return *cached;
        }

        let open = match self.probe.has_trading_data(date).await {
            Ok(has_data) => {
                if !has_data {
                    warn!("{} 공휴일 감지 — 봇 미실행", key);
                }
                has_data
            }
            Err(e) => {
                warn!("공휴일 확인 실패 ({}) — 장 열린 것으로 간주", e);
                true
            }
        };

        cache.insert(key, open);
        open
    }

    /// 오늘(KST)이 거래일인지.
    pub async fn is_trading_today(&self) -> bool {
        self.is_trading_day(today_kst()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingProbe {
        calls: Arc<AtomicUsize>,
        /// None이면 프로브 에러를 흉내낸다
        answer: Option<bool>,
    }

    impl CountingProbe {
        fn new(answer: Option<bool>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: Arc::clone(&calls),
                    answer,
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl DayProbe for CountingProbe {
        async fn has_trading_data(&self, _date: NaiveDate) -> BotResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Some(v) => Ok(v),
                None => Err(crate::BotError::Network("probe down".to_string())),
            }
        }
    }

    #[test]
    fn test_previous_trading_day() {
        // 2026-08-03 월요일 → 2026-07-31 금요일
        let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        assert_eq!(
            previous_trading_day(monday),
            Some(NaiveDate::from_ymd_opt(2026, 7, 31).unwrap())
        );

        // 화요일 → 전날
        let tuesday = NaiveDate::from_ymd_opt(2026, 8, 4).unwrap();
        assert_eq!(previous_trading_day(tuesday), Some(monday));

        // 주말 → None
        let saturday = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        assert_eq!(previous_trading_day(saturday), None);
        let sunday = NaiveDate::from_ymd_opt(2026, 8, 2).unwrap();
        assert_eq!(previous_trading_day(sunday), None);
    }

    #[tokio::test]
    async fn test_weekend_never_probes() {
        let (probe, calls) = CountingProbe::new(Some(true));
        let calendar = TradingCalendar::new(Box::new(probe));

        let saturday = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        assert!(!calendar.is_trading_day(saturday).await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probe_cached_per_day() {
        let (probe, calls) = CountingProbe::new(Some(true));
        let calendar = TradingCalendar::new(Box::new(probe));

        let weekday = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        for _ in 0..5 {
            assert!(calendar.is_trading_day(weekday).await);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_probe_failure_fails_open() {
        let (probe, _calls) = CountingProbe::new(None);
        let calendar = TradingCalendar::new(Box::new(probe));
        let weekday = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        assert!(calendar.is_trading_day(weekday).await);
    }

    #[tokio::test]
    async fn test_holiday_detected() {
        let (probe, _calls) = CountingProbe::new(Some(false));
        let calendar = TradingCalendar::new(Box::new(probe));
        let weekday = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        assert!(!calendar.is_trading_day(weekday).await);
    }
}
