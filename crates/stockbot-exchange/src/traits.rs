//! 코어가 소비하는 브로커 추상 인터페이스.

use async_trait::async_trait;

use crate::error::ExchangeResult;
use crate::types::{Balance, Market, Orderbook, OrderResult, RankedStock, StockPrice};

/// 브로커 게이트웨이.
///
/// 모든 구현체는 REST 호출 전 유량 제한을 통과해야 하고,
/// 토큰 갱신 실패는 [`crate::ExchangeError::Unauthorized`]로 드러난다.
#[async_trait]
pub trait Broker: Send + Sync {
    /// 단일 종목 현재가 조회.
    async fn get_price(&self, ticker: &str) -> ExchangeResult<StockPrice>;

    /// 단일 종목 호가 10단 조회.
    async fn get_orderbook(&self, ticker: &str) -> ExchangeResult<Orderbook>;

    /// 거래량 순위 (소~중형 필터 적용).
    async fn get_volume_rank(&self, market: Market) -> ExchangeResult<Vec<RankedStock>>;

    /// 등락률 순위 (소~중형 필터 적용).
    async fn get_change_rank(&self, market: Market) -> ExchangeResult<Vec<RankedStock>>;

    /// 시장가 매수 — 금액(원)으로 수량을 계산한다.
    async fn buy(&self, ticker: &str, name: &str, amount_krw: i64) -> ExchangeResult<OrderResult>;

    /// 시장가 매도 — qty 0이면 잔고에서 보유 수량을 조회한다.
    async fn sell(&self, ticker: &str, name: &str, qty: i64) -> ExchangeResult<OrderResult>;

    /// 계좌 잔고 조회.
    async fn get_balance(&self) -> ExchangeResult<Balance>;

    /// 특정 종목 보유 수량 (없으면 0).
    async fn held_qty(&self, ticker: &str) -> ExchangeResult<i64> {
        let balance = self.get_balance().await?;
        Ok(balance
            .holdings
            .iter()
            .find(|h| h.ticker == ticker)
            .map(|h| h.qty)
            .unwrap_or(0))
    }
}
