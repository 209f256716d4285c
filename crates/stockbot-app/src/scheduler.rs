//! KST 고정 시각 스케줄러.
//!
//! 각 잡은 자기 태스크에서 다음 발화 시각(KST)까지 잠들었다가 본문을
//! 실행한다. 본문 에러·패닉은 잡 안에서 소화된다 — 다음 발화는 영향받지
//! 않는다. 주간 잡은 요일 필터를 추가로 가진다.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Weekday};
use chrono_tz::Asia::Seoul;
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tracing::{error, info};

use stockbot_core::now_kst;

/// 스케줄 엔트리.
#[derive(Debug, Clone, Copy)]
pub struct CronEntry {
    pub id: &'static str,
    pub hour: u32,
    pub minute: u32,
    /// None = 매일, Some = 해당 요일만
    pub weekday: Option<Weekday>,
}

impl CronEntry {
    pub const fn daily(id: &'static str, hour: u32, minute: u32) -> Self {
        Self {
            id,
            hour,
            minute,
            weekday: None,
        }
    }

    pub const fn weekly(id: &'static str, weekday: Weekday, hour: u32, minute: u32) -> Self {
        Self {
            id,
            hour,
            minute,
            weekday: Some(weekday),
        }
    }
}

/// 기준 시각 이후의 다음 발화 시각 (KST).
pub fn next_fire(entry: &CronEntry, after: DateTime<Tz>) -> DateTime<Tz> {
    let mut date = after.date_naive();

    loop {
        if entry.weekday.map(|w| date.weekday() == w).unwrap_or(true) {
            let naive = date
                .and_hms_opt(entry.hour, entry.minute, 0)
                .expect("유효한 시각");
            // DST 없는 고정 오프셋 시간대라 single()은 항상 성립
            if let Some(fire) = Seoul.from_local_datetime(&naive).single() {
                if fire > after {
                    return fire;
                }
            }
        }
        date += ChronoDuration::days(1);
    }
}

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// 잡 스케줄러.
pub struct Scheduler {
    jobs: Vec<(CronEntry, JobFn)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// 잡 등록. 본문은 매 발화마다 새 future를 만든다.
    pub fn add_job<F, Fut>(&mut self, entry: CronEntry, body: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.jobs
            .push((entry, Arc::new(move || Box::pin(body()) as JobFuture)));
    }

    /// 모든 잡 태스크 기동.
    pub fn spawn_all(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for (entry, body) in self.jobs {
            handles.push(tokio::spawn(async move {
                loop {
                    let now = now_kst();
                    let fire_at = next_fire(&entry, now);
                    let wait = (fire_at - now)
                        .to_std()
                        .unwrap_or(std::time::Duration::ZERO);
                    info!(
                        job = entry.id,
                        fire_at = %fire_at.format("%m-%d %H:%M"),
                        "다음 발화 대기"
                    );
                    tokio::time::sleep(wait).await;

                    info!(job = entry.id, "잡 실행 시작");
                    // 잡 본문 패닉도 스케줄을 죽이지 않는다
                    let result = tokio::spawn((body)()).await;
                    match result {
                        Ok(()) => info!(job = entry.id, "잡 실행 완료"),
                        Err(e) => error!(job = entry.id, "잡 패닉: {}", e),
                    }
                }
            }));
        }

        handles
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kst(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        Seoul.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_next_fire_same_day() {
        let entry = CronEntry::daily("perf_batch", 15, 45);
        // 같은 날 아침 → 당일 15:45
        let fire = next_fire(&entry, kst(2026, 8, 5, 9, 0));
        assert_eq!(fire, kst(2026, 8, 5, 15, 45));
    }

    #[test]
    fn test_next_fire_rolls_to_tomorrow() {
        let entry = CronEntry::daily("data_collector", 6, 0);
        // 06:00 이후 → 다음날 06:00
        let fire = next_fire(&entry, kst(2026, 8, 5, 6, 0));
        assert_eq!(fire, kst(2026, 8, 6, 6, 0));
    }

    #[test]
    fn test_next_fire_weekly() {
        let entry = CronEntry::weekly("principles", Weekday::Sun, 3, 0);
        // 수요일 → 다음 일요일 03:00
        let wednesday = kst(2026, 8, 5, 10, 0);
        assert_eq!(wednesday.weekday(), Weekday::Wed);
        let fire = next_fire(&entry, wednesday);
        assert_eq!(fire, kst(2026, 8, 9, 3, 0));
        assert_eq!(fire.weekday(), Weekday::Sun);
    }

    #[test]
    fn test_next_fire_weekly_same_day_before_time() {
        let entry = CronEntry::weekly("compression", Weekday::Sun, 3, 30);
        // 일요일 03:00 → 당일 03:30
        let sunday = kst(2026, 8, 9, 3, 0);
        assert_eq!(sunday.weekday(), Weekday::Sun);
        assert_eq!(next_fire(&entry, sunday), kst(2026, 8, 9, 3, 30));

        // 일요일 04:00 → 다음 일요일
        assert_eq!(next_fire(&entry, kst(2026, 8, 9, 4, 0)), kst(2026, 8, 16, 3, 30));
    }

    #[test]
    fn test_schedule_ordering_on_trading_day() {
        // §5 순서 보장: 하루 스케줄 시각이 엄격히 증가한다
        let after = kst(2026, 8, 5, 0, 0);
        let times: Vec<_> = [
            CronEntry::daily("data_collector", 6, 0),
            CronEntry::daily("morning_bot", 7, 30),
            CronEntry::daily("rt_start", 9, 0),
            CronEntry::daily("force_close", 14, 50),
            CronEntry::daily("final_close", 15, 20),
            CronEntry::daily("rt_stop", 15, 30),
            CronEntry::daily("perf_batch", 15, 45),
        ]
        .iter()
        .map(|e| next_fire(e, after))
        .collect();

        for pair in times.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
