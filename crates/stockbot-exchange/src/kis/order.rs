//! KIS 주문 API — 시장가 매수/매도, 잔고 조회.
//!
//! 모의/실전 분기는 설정의 환경이 결정한다 (tr_id 테이블 참조).
//! 매수는 금액(원) → 현재가 기준 수량 계산, 매도는 qty 0이면
//! 잔고에서 보유 수량을 조회한다.

use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::config::tr_id;
use super::quote::{v_f64, v_i64, v_str};
use super::KisBroker;
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{Balance, Holding, OrderResult};

impl KisBroker {
    fn empty_result(&self, ticker: &str, name: &str) -> OrderResult {
        OrderResult {
            ticker: ticker.to_string(),
            name: name.to_string(),
            mode: self.config.environment.label().to_string(),
            ..Default::default()
        }
    }

    /// 주문 POST 공통.
    async fn post_order(&self, tr: &str, body: &Value) -> ExchangeResult<Value> {
        self.limiter.acquire().await;

        let url = format!(
            "{}/uapi/domestic-stock/v1/trading/order-cash",
            self.config.rest_base_url()
        );
        let headers = self.auth_headers(tr, true).await?;

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            return Err(ExchangeError::ApiError {
                code: status.as_u16() as i32,
                message: text,
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| ExchangeError::ParseError(format!("주문 응답 파싱 실패: {}", e)))
    }

    /// 시장가 매수.
    pub(crate) async fn submit_buy(
        &self,
        ticker: &str,
        name: &str,
        amount_krw: i64,
    ) -> ExchangeResult<OrderResult> {
        let mut result = self.empty_result(ticker, name);

        // 현재가 조회 → 수량 계산
        let price_info = self.fetch_price(ticker).await?;
        let current_price = price_info.last;
        if current_price <= 0 {
            result.message = "현재가 조회 실패".to_string();
            return Ok(result);
        }

        let qty = amount_krw / current_price;
        if qty <= 0 {
            result.message = format!(
                "매수 수량 0 (현재가 {}원 > 매수금액 {}원)",
                current_price, amount_krw
            );
            warn!("{}({}) 매수 수량 0 — 건너뜀", name, ticker);
            return Ok(result);
        }

        let body = json!({
            "CANO":         self.config.account_no,
            "ACNT_PRDT_CD": self.config.account_code,
            "PDNO":         ticker,
            "ORD_DVSN":     "01",   // 01: 시장가
            "ORD_QTY":      qty.to_string(),
            "ORD_UNPR":     "0",
        });

        let data = self.post_order(tr_id::buy(self.config.environment), &body).await?;

        if v_str(&data, "rt_cd") == "0" {
            let output = data.get("output").cloned().unwrap_or(Value::Null);
            let order_no = {
                let upper = v_str(&output, "ODNO");
                if upper.is_empty() {
                    v_str(&output, "odno")
                } else {
                    upper
                }
            };
            result.success = true;
            result.order_no = Some(order_no.clone());
            result.qty = qty;
            result.buy_price = current_price;
            result.total_amount = qty * current_price;
            result.message = format!("매수 체결 완료 — {}주 × {}원", qty, current_price);
            info!(
                "{} 매수 — {}({}) {}주 × {}원 주문번호:{}",
                result.mode, name, ticker, qty, current_price, order_no
            );
        } else {
            let msg = {
                let m = v_str(&data, "msg1");
                if m.is_empty() {
                    v_str(&data, "msg_cd")
                } else {
                    m
                }
            };
            result.message = format!("매수 거부: {}", msg);
            warn!("{} 매수 실패 — {}({}): {}", result.mode, name, ticker, msg);
        }

        Ok(result)
    }

    /// 시장가 매도. qty 0이면 잔고에서 보유 수량을 조회한다.
    pub(crate) async fn submit_sell(
        &self,
        ticker: &str,
        name: &str,
        qty: i64,
    ) -> ExchangeResult<OrderResult> {
        let mut result = self.empty_result(ticker, name);

        let sell_qty = if qty > 0 {
            qty
        } else {
            let held = self.held_qty_internal(ticker).await.unwrap_or(0);
            if held <= 0 {
                result.message = format!("{} 보유 수량 없음", ticker);
                warn!("{}({}) 보유 없음 — 매도 건너뜀", name, ticker);
                return Ok(result);
            }
            held
        };

        // 추정 매도금액 계산용 현재가 (실패해도 주문은 진행)
        let sell_price = self
            .fetch_price(ticker)
            .await
            .map(|p| p.last)
            .unwrap_or(0);

        let body = json!({
            "CANO":         self.config.account_no,
            "ACNT_PRDT_CD": self.config.account_code,
            "PDNO":         ticker,
            "ORD_DVSN":     "01",
            "ORD_QTY":      sell_qty.to_string(),
            "ORD_UNPR":     "0",
            "SLL_TYPE":     "01",   // 01: 일반 매도
        });

        let data = self.post_order(tr_id::sell(self.config.environment), &body).await?;

        if v_str(&data, "rt_cd") == "0" {
            let output = data.get("output").cloned().unwrap_or(Value::Null);
            let order_no = {
                let upper = v_str(&output, "ODNO");
                if upper.is_empty() {
                    v_str(&output, "odno")
                } else {
                    upper
                }
            };
            result.success = true;
            result.order_no = Some(order_no.clone());
            result.qty = sell_qty;
            result.sell_price = sell_price;
            result.total_amount = sell_qty * sell_price;
            result.message = format!("매도 체결 완료 — {}주 (추정가 {}원)", sell_qty, sell_price);
            info!(
                "{} 매도 — {}({}) {}주 추정가 {}원 주문번호:{}",
                result.mode, name, ticker, sell_qty, sell_price, order_no
            );
        } else {
            let msg = {
                let m = v_str(&data, "msg1");
                if m.is_empty() {
                    v_str(&data, "msg_cd")
                } else {
                    m
                }
            };
            result.message = format!("매도 거부: {}", msg);
            warn!("{} 매도 실패 — {}({}): {}", result.mode, name, ticker, msg);
        }

        Ok(result)
    }

    /// 계좌 잔고 조회.
    pub(crate) async fn fetch_balance(&self) -> ExchangeResult<Balance> {
        let body = self
            .get_json(
                "/uapi/domestic-stock/v1/trading/inquire-balance",
                tr_id::balance(self.config.environment),
                true,
                &[
                    ("CANO", self.config.account_no.as_str()),
                    ("ACNT_PRDT_CD", self.config.account_code.as_str()),
                    ("AFHR_FLPR_YN", "N"),
                    ("OFL_YN", ""),
                    ("INQR_DVSN", "02"),
                    ("UNPR_DVSN", "01"),
                    ("FUND_STTL_ICLD_YN", "N"),
                    ("FNCG_AMT_AUTO_RDPT_YN", "N"),
                    ("PRCS_DVSN", "00"),
                    ("CTX_AREA_FK100", ""),
                    ("CTX_AREA_NK100", ""),
                ],
            )
            .await?;

        if v_str(&body, "rt_cd") != "0" {
            let msg = v_str(&body, "msg1");
            error!("잔고 조회 실패: {}", msg);
            return Err(ExchangeError::ApiError { code: -1, message: msg });
        }

        let mut holdings = Vec::new();
        if let Some(rows) = body.get("output1").and_then(|v| v.as_array()) {
            for item in rows {
                let qty = v_i64(item, "hldg_qty");
                if qty <= 0 {
                    continue;
                }
                holdings.push(Holding {
                    ticker: v_str(item, "pdno"),
                    name: v_str(item, "prdt_name"),
                    qty,
                    avg_price: v_f64(item, "pchs_avg_pric"),
                    current_price: v_f64(item, "prpr"),
                    profit_rate: v_f64(item, "evlu_pfls_rt"),
                });
            }
        }

        let summary = match body.get("output2") {
            Some(Value::Array(arr)) => arr.first().cloned().unwrap_or(Value::Null),
            Some(v) => v.clone(),
            None => Value::Null,
        };

        Ok(Balance {
            holdings,
            available_cash: v_f64(&summary, "ord_psbl_cash") as i64,
            total_eval: v_f64(&summary, "tot_evlu_amt") as i64,
            total_profit_pct: v_f64(&summary, "evlu_pfls_rt"),
        })
    }

    async fn held_qty_internal(&self, ticker: &str) -> ExchangeResult<i64> {
        let balance = self.fetch_balance().await?;
        Ok(balance
            .holdings
            .iter()
            .find(|h| h.ticker == ticker)
            .map(|h| h.qty)
            .unwrap_or(0))
    }
}
