//! KIS REST 시세 조회 — 현재가·호가·거래량/등락률 순위.
//!
//! 순위 API는 소~중형 필터를 적용한다:
//! - 코스피: 중형(2) + 소형(3) 2회 호출 후 종목코드 기준 중복 제거
//! - 코스닥: 전체 1회 호출 (우선주/스팩/ETF 제외 코드 적용)
//! - 공통: hts_avls(억원) 기반 시총 사후 필터 — API의 규모구분이 무시되는
//!   경우가 있어 응답 측에서 한 번 더 거른다

use serde_json::Value;
use tracing::{debug, info, warn};

use super::config::tr_id;
use super::KisBroker;
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{Market, Orderbook, OrderbookLevel, RankedStock, StockPrice};

/// 순위 사후 필터 시총 상한 (억원).
const MARKET_CAP_MAX_100M: i64 = 3_000;

/// JSON 문자열 필드 → i64 (KIS는 숫자를 문자열로 내려준다).
pub(crate) fn v_i64(value: &Value, key: &str) -> i64 {
    match value.get(key) {
        Some(Value::String(s)) => s.replace(',', "").trim().parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        _ => 0,
    }
}

/// JSON 문자열 필드 → f64.
pub(crate) fn v_f64(value: &Value, key: &str) -> f64 {
    match value.get(key) {
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// JSON 문자열 필드 → String.
pub(crate) fn v_str(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

impl KisBroker {
    /// 인증 헤더 공통 생성.
    pub(crate) async fn auth_headers(
        &self,
        tr: &str,
        custtype: bool,
    ) -> ExchangeResult<reqwest::header::HeaderMap> {
        let token = self.oauth.get_token().await?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Content-Type",
            "application/json; charset=utf-8".parse().unwrap(),
        );
        headers.insert(
            "authorization",
            format!("Bearer {}", token).parse().map_err(|_| {
                ExchangeError::ParseError("authorization 헤더 값 오류".to_string())
            })?,
        );
        headers.insert(
            "appkey",
            self.config.app_key.parse().map_err(|_| {
                ExchangeError::ParseError("app_key에 유효하지 않은 문자 포함".to_string())
            })?,
        );
        headers.insert(
            "appsecret",
            self.config.app_secret_str().parse().map_err(|_| {
                ExchangeError::ParseError("app_secret에 유효하지 않은 문자 포함".to_string())
            })?,
        );
        headers.insert(
            "tr_id",
            tr.parse()
                .map_err(|_| ExchangeError::ParseError(format!("tr_id 값 오류: {}", tr)))?,
        );
        if custtype {
            headers.insert("custtype", "P".parse().unwrap());
        }
        Ok(headers)
    }

    /// GET 호출 공통 — 유량 제한 → 요청 → JSON.
    pub(crate) async fn get_json(
        &self,
        path: &str,
        tr: &str,
        custtype: bool,
        params: &[(&str, &str)],
    ) -> ExchangeResult<Value> {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.config.rest_base_url(), path);
        let headers = self.auth_headers(tr, custtype).await?;

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .query(params)
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
            .map_err(|e| ExchangeError::ParseError(format!("응답 파싱 실패: {}", e)))
    }

    /// 단일 종목 현재가.
    pub(crate) async fn fetch_price(&self, ticker: &str) -> ExchangeResult<StockPrice> {
        let body = self
            .get_json(
                "/uapi/domestic-stock/v1/quotations/inquire-price",
                tr_id::PRICE,
                false,
                &[("FID_COND_MRKT_DIV_CODE", "J"), ("FID_INPUT_ISCD", ticker)],
            )
            .await?;

        let out = body
            .get("output")
            .ok_or_else(|| ExchangeError::ParseError("output 없음".to_string()))?;

        Ok(StockPrice {
            name: v_str(out, "hts_kor_isnm"),
            last: v_i64(out, "stck_prpr"),
            open: v_i64(out, "stck_oprc"),
            change_pct: v_f64(out, "prdy_ctrt"),
            cum_volume: v_i64(out, "acml_vol"),
        })
    }

    /// 단일 종목 호가 10단.
    pub(crate) async fn fetch_orderbook(&self, ticker: &str) -> ExchangeResult<Orderbook> {
        let body = self
            .get_json(
                "/uapi/domestic-stock/v1/quotations/inquire-asking-price-exp-ccn",
                tr_id::ORDERBOOK,
                false,
                &[("FID_COND_MRKT_DIV_CODE", "J"), ("FID_INPUT_ISCD", ticker)],
            )
            .await?;

        let out = body
            .get("output1")
            .filter(|v| !v.is_null())
            .ok_or_else(|| ExchangeError::ParseError("호가 응답 비어있음".to_string()))?;

        let mut asks = Vec::with_capacity(10);
        let mut bids = Vec::with_capacity(10);
        for i in 1..=10 {
            let ask_price = v_i64(out, &format!("askp{}", i));
            if ask_price > 0 {
                asks.push(OrderbookLevel {
                    price: ask_price,
                    qty: v_i64(out, &format!("askp_rsqn{}", i)),
                });
            }
            let bid_price = v_i64(out, &format!("bidp{}", i));
            if bid_price > 0 {
                bids.push(OrderbookLevel {
                    price: bid_price,
                    qty: v_i64(out, &format!("bidp_rsqn{}", i)),
                });
            }
        }

        // 총잔량은 output2 (단일 객체 또는 배열)
        let out2 = match body.get("output2") {
            Some(Value::Array(arr)) => arr.first().cloned().unwrap_or(Value::Null),
            Some(v) => v.clone(),
            None => Value::Null,
        };

        Ok(Orderbook {
            ticker: ticker.to_string(),
            asks,
            bids,
            total_ask: v_i64(&out2, "total_askp_rsqn"),
            total_bid: v_i64(&out2, "total_bidp_rsqn"),
        })
    }

    /// 거래량 순위.
    pub(crate) async fn fetch_volume_rank(
        &self,
        market: Market,
    ) -> ExchangeResult<Vec<RankedStock>> {
        info!("{} 거래량 순위 조회 (소~중형 필터)", market.label_kr());

        let rows = match market {
            Market::Kospi => {
                // 중형 + 소형 각각 호출 후 합산 — 대형주 제외
                let mid = self.fetch_volume_once(market, "2").await?;
                let small = self.fetch_volume_once(market, "3").await?;
                dedup_by_code(mid.into_iter().chain(small).collect())
            }
            Market::Kosdaq => self.fetch_volume_once(market, "0").await?,
        };

        info!("{} 거래량 파싱 완료 — {}종목", market.label_kr(), rows.len());
        Ok(rows)
    }

    async fn fetch_volume_once(
        &self,
        market: Market,
        blng_cls: &str,
    ) -> ExchangeResult<Vec<RankedStock>> {
        let body = self
            .get_json(
                "/uapi/domestic-stock/v1/quotations/volume-rank",
                tr_id::VOLUME_RANK,
                true,
                &[
                    ("FID_COND_MRKT_DIV_CODE", "J"),
                    ("FID_COND_SCR_DIV_CODE", "20171"),
                    ("FID_INPUT_ISCD", market.input_iscd()),
                    ("FID_DIV_CLS_CODE", "0"),
                    ("FID_BLNG_CLS_CODE", blng_cls),
                    ("FID_TRGT_CLS_CODE", "111111111"),
                    ("FID_TRGT_EXLS_CLS_CODE", "000111"),
                    ("FID_INPUT_PRICE_1", "0"),
                    ("FID_INPUT_PRICE_2", "0"),
                    ("FID_VOL_CNT", "100"),
                    ("FID_INPUT_DATE_1", ""),
                ],
            )
            .await?;

        Ok(parse_rank_rows(&body, "mksc_shrn_iscd", true))
    }

    /// 등락률 순위 (0~10% 초기 급등 구간).
    pub(crate) async fn fetch_change_rank(
        &self,
        market: Market,
    ) -> ExchangeResult<Vec<RankedStock>> {
        let mut rows = match market {
            Market::Kospi => {
                let mid = self.fetch_change_once(market, "2", "0001111").await?;
                let small = self.fetch_change_once(market, "3", "0001111").await?;
                dedup_by_code(mid.into_iter().chain(small).collect())
            }
            Market::Kosdaq => self.fetch_change_once(market, "0", "1111111").await?,
        };

        rows.sort_by(|a, b| {
            b.change_rate
                .partial_cmp(&a.change_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows.truncate(30);
        info!("{} 등락률 파싱 완료 — {}종목", market.label_kr(), rows.len());
        Ok(rows)
    }

    async fn fetch_change_once(
        &self,
        market: Market,
        blng_cls: &str,
        exls_cls: &str,
    ) -> ExchangeResult<Vec<RankedStock>> {
        let body = self
            .get_json(
                "/uapi/domestic-stock/v1/ranking/fluctuation",
                tr_id::CHANGE_RANK,
                true,
                &[
                    ("FID_COND_MRKT_DIV_CODE", "J"),
                    ("FID_COND_SCR_DIV_CODE", "20170"),
                    ("FID_INPUT_ISCD", market.input_iscd()),
                    ("FID_RANK_SORT_CLS_CODE", "0"),
                    ("FID_INPUT_CNT_1", "0"),
                    ("FID_PRC_CLS_CODE", "0"),
                    ("FID_INPUT_PRICE_1", "0"),
                    ("FID_INPUT_PRICE_2", "0"),
                    ("FID_VOL_CNT", "100"),
                    ("FID_TRGT_CLS_CODE", "0"),
                    ("FID_TRGT_EXLS_CLS_CODE", exls_cls),
                    ("FID_DIV_CLS_CODE", "0"),
                    ("FID_BLNG_CLS_CODE", blng_cls),
                    ("FID_RSFL_RATE1", "0"),
                    ("FID_RSFL_RATE2", "10"),
                ],
            )
            .await?;

        Ok(parse_rank_rows(&body, "stck_shrn_iscd", false))
    }
}

/// 순위 응답 공통 파싱. `require_prev_vol`이면 전일 거래량 0인 행은 버린다.
fn parse_rank_rows(body: &Value, code_key: &str, require_prev_vol: bool) -> Vec<RankedStock> {
    let rt_cd = v_str(body, "rt_cd");
    let raw_list = body
        .get("output1")
        .or_else(|| body.get("output"))
        .or_else(|| body.get("output2"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    debug!(rt_cd = %rt_cd, rows = raw_list.len(), "순위 응답 수신");

    let mut result = Vec::new();
    for item in &raw_list {
        let cum_volume = v_i64(item, "acml_vol");
        let prev_volume = v_i64(item, "prdy_vol");
        if cum_volume <= 0 {
            continue;
        }
        if require_prev_vol && prev_volume <= 0 {
            continue;
        }

        // 시총 사후 필터 — hts_avls가 없는(0) 행은 통과
        let cap_100m = v_i64(item, "hts_avls");
        if cap_100m > 0 && cap_100m > MARKET_CAP_MAX_100M {
            continue;
        }

        result.push(RankedStock {
            code: v_str(item, code_key),
            name: v_str(item, "hts_kor_isnm"),
            price: v_i64(item, "stck_prpr"),
            change_rate: v_f64(item, "prdy_ctrt"),
            cum_volume,
            prev_volume: prev_volume.max(1),
            market_cap_100m: cap_100m,
        });
    }

    if result.is_empty() && !raw_list.is_empty() {
        warn!("순위 전 행이 필터에서 제외됨 (rows={})", raw_list.len());
    }
    result
}

/// 종목코드(없으면 종목명) 기준 중복 제거 — 먼저 온 행 우선.
fn dedup_by_code(rows: Vec<RankedStock>) -> Vec<RankedStock> {
    let mut seen = std::collections::HashSet::new();
    rows.into_iter()
        .filter(|r| {
            let key = if r.code.is_empty() {
                r.name.clone()
            } else {
                r.code.clone()
            };
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_helpers() {
        let v = json!({"a": "1,234", "b": "3.5", "c": 7, "d": "x"});
        assert_eq!(v_i64(&v, "a"), 1_234);
        assert_eq!(v_f64(&v, "b"), 3.5);
        assert_eq!(v_i64(&v, "c"), 7);
        assert_eq!(v_i64(&v, "d"), 0);
        assert_eq!(v_i64(&v, "missing"), 0);
    }

    #[test]
    fn test_parse_rank_rows_filters() {
        let body = json!({
            "rt_cd": "0",
            "output1": [
                {"mksc_shrn_iscd": "000001", "hts_kor_isnm": "정상", "stck_prpr": "1000",
                 "prdy_ctrt": "5.0", "acml_vol": "100", "prdy_vol": "50", "hts_avls": "500"},
                {"mksc_shrn_iscd": "000002", "hts_kor_isnm": "대형주", "stck_prpr": "1000",
                 "prdy_ctrt": "5.0", "acml_vol": "100", "prdy_vol": "50", "hts_avls": "5000"},
                {"mksc_shrn_iscd": "000003", "hts_kor_isnm": "거래없음", "stck_prpr": "1000",
                 "prdy_ctrt": "5.0", "acml_vol": "0", "prdy_vol": "50"},
                {"mksc_shrn_iscd": "000004", "hts_kor_isnm": "시총미제공", "stck_prpr": "1000",
                 "prdy_ctrt": "5.0", "acml_vol": "100", "prdy_vol": "50"}
            ]
        });
        let rows = parse_rank_rows(&body, "mksc_shrn_iscd", true);
        let codes: Vec<_> = rows.iter().map(|r| r.code.as_str()).collect();
        // 대형주(시총 3000억 초과)·거래없음 제외, 시총 미제공은 통과
        assert_eq!(codes, vec!["000001", "000004"]);
    }

    #[test]
    fn test_dedup_by_code() {
        let mk = |code: &str| RankedStock {
            code: code.to_string(),
            name: "n".to_string(),
            price: 1,
            change_rate: 1.0,
            cum_volume: 1,
            prev_volume: 1,
            market_cap_100m: 0,
        };
        let rows = dedup_by_code(vec![mk("A"), mk("B"), mk("A")]);
        assert_eq!(rows.len(), 2);
    }
}
