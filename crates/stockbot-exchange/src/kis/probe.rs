//! 거래일 프로브 — 코스피 거래량 순위 존재 여부로 당일 개장을 판정한다.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use stockbot_core::{BotError, BotResult, DayProbe};

use crate::traits::Broker;
use crate::types::Market;

/// 브로커 기반 거래일 프로브.
///
/// 순위 API는 당일 세션 기준이라 과거 날짜는 조회할 수 없다 —
/// 캘린더는 오늘 날짜만 프로브하므로 충분하다.
pub struct KisDayProbe {
    broker: Arc<dyn Broker>,
}

impl KisDayProbe {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl DayProbe for KisDayProbe {
    async fn has_trading_data(&self, _date: NaiveDate) -> BotResult<bool> {
        let rows = self
            .broker
            .get_volume_rank(Market::Kospi)
            .await
            .map_err(|e| BotError::Broker(e.to_string()))?;
        Ok(!rows.is_empty())
    }
}
