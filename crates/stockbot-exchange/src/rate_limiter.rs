//! KIS API 호출 유량 제한.
//!
//! 1초 고정 윈도우 카운터. 한도 도달 시 윈도우 끝까지 대기 후 통과한다.
//! 카운터와 윈도우 시각은 단일 뮤텍스로 보호하며, 대기 중에는 락을 풀어
//! 다른 태스크의 try_acquire를 막지 않는다.
//!
//! 한도는 매매 모드에서 선택된다: 모의(VTS) 2회/s, 실전(REAL) 19회/s
//! (공식 20회에서 여유 1회 제외).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use stockbot_core::TradingMode;

struct Window {
    count: u32,
    started_at: Instant,
}

/// 고정 윈도우 유량 제한기.
pub struct RateLimiter {
    rate: u32,
    period: Duration,
    window: Mutex<Window>,
}

impl RateLimiter {
    /// 한도(rate)/기간(period) 지정 생성.
    pub fn new(rate: u32, period: Duration) -> Self {
        Self {
            rate,
            period,
            window: Mutex::new(Window {
                count: 0,
                started_at: Instant::now() - period,
            }),
        }
    }

    /// 매매 모드에서 한도를 선택해 생성 (기간 1초).
    pub fn for_mode(mode: TradingMode) -> Self {
        let rate = mode.rate_limit_per_sec();
        debug!(mode = %mode, rate, "rate limiter 초기화");
        Self::new(rate, Duration::from_secs(1))
    }

    /// 현재 윈도우 누적 호출 수.
    pub fn count(&self) -> u32 {
        let window = self.window.lock().unwrap();
        if window.started_at.elapsed() > self.period {
            0
        } else {
            window.count
        }
    }

    /// 즉시 허가 시도. 한도 초과면 false.
    pub fn try_acquire(&self) -> bool {
        let mut window = self.window.lock().unwrap();
        if window.started_at.elapsed() > self.period {
            window.count = 0;
            window.started_at = Instant::now();
        }
        if window.count >= self.rate {
            return false;
        }
        window.count += 1;
        true
    }

    /// 호출 허가 획득. 한도 초과 시 윈도우가 끝날 때까지 대기한다.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().unwrap();
                let elapsed = window.started_at.elapsed();
                if elapsed > self.period {
                    window.count = 0;
                    window.started_at = Instant::now();
                }
                if window.count < self.rate {
                    window.count += 1;
                    return;
                }
                // 남은 기간 + 여유 50ms
                self.period.saturating_sub(window.started_at.elapsed())
                    + Duration::from_millis(50)
            };

            debug!(rate = self.rate, wait_ms = wait.as_millis() as u64, "한도 도달 — 대기");
            tokio::time::sleep(wait).await;
        }
    }
}
