//! 한국투자증권(KIS) 커넥터.

pub mod auth;
pub mod config;
pub mod order;
pub mod probe;
pub mod quote;
pub mod websocket;

pub use auth::{KisOAuth, TokenState};
pub use config::{tr_id, KisConfig, KisEnvironment};
pub use probe::KisDayProbe;
pub use websocket::KisTickStream;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ExchangeResult;
use crate::rate_limiter::RateLimiter;
use crate::traits::Broker;
use crate::types::{Balance, Market, Orderbook, OrderResult, RankedStock, StockPrice};

/// KIS 브로커 게이트웨이.
///
/// 모드(모의/실전)별로 독립 인스턴스를 만든다 — 토큰 캐시는 공유되지 않는다.
pub struct KisBroker {
    pub(crate) config: KisConfig,
    pub(crate) oauth: Arc<KisOAuth>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) client: reqwest::Client,
}

impl KisBroker {
    pub fn new(config: KisConfig, limiter: Arc<RateLimiter>) -> ExchangeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                crate::ExchangeError::NetworkError(format!("HTTP client 생성 실패: {}", e))
            })?;
        let oauth = Arc::new(KisOAuth::new(config.clone())?);

        Ok(Self {
            config,
            oauth,
            limiter,
            client,
        })
    }

    /// 토큰 캐시 핸들 (WebSocket 스트림과 공유).
    pub fn oauth(&self) -> Arc<KisOAuth> {
        Arc::clone(&self.oauth)
    }

    pub fn config(&self) -> &KisConfig {
        &self.config
    }
}

#[async_trait]
impl Broker for KisBroker {
    async fn get_price(&self, ticker: &str) -> ExchangeResult<StockPrice> {
        self.fetch_price(ticker).await
    }

    async fn get_orderbook(&self, ticker: &str) -> ExchangeResult<Orderbook> {
        self.fetch_orderbook(ticker).await
    }

    async fn get_volume_rank(&self, market: Market) -> ExchangeResult<Vec<RankedStock>> {
        self.fetch_volume_rank(market).await
    }

    async fn get_change_rank(&self, market: Market) -> ExchangeResult<Vec<RankedStock>> {
        self.fetch_change_rank(market).await
    }

    async fn buy(&self, ticker: &str, name: &str, amount_krw: i64) -> ExchangeResult<OrderResult> {
        self.submit_buy(ticker, name, amount_krw).await
    }

    async fn sell(&self, ticker: &str, name: &str, qty: i64) -> ExchangeResult<OrderResult> {
        self.submit_sell(ticker, name, qty).await
    }

    async fn get_balance(&self) -> ExchangeResult<Balance> {
        self.fetch_balance().await
    }
}
