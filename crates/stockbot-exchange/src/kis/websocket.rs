//! KIS 실시간 체결·호가 WebSocket 클라이언트.
//!
//! # 프레임 형식
//!
//! 데이터 프레임은 파이프(|) 구분 4필드다:
//! `암호화여부|TR_ID|건수|본문` — 본문은 캐럿(^) 구분 필드 나열.
//! JSON으로 시작하는 프레임은 구독 ack/PINGPONG 제어 메시지다.
//!
//! # 재연결 정책
//!
//! 네트워크 단절 시 5초 → 30초 → 120초 단계 백오프로 재시도하고,
//! 누적 60회를 넘으면 장 마감으로 간주하고 [`RealtimeEvent::Exhausted`]를
//! 보낸 뒤 종료한다. 연결/종료 루프 반복은 KIS 차단 사유라 재연결 외의
//! connect 재호출은 하지 않는다.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::auth::KisOAuth;
use super::config::tr_id;
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{OrderbookLevel, RealtimeEvent, RealtimeOrderbook, RealtimeTrade};

/// 재연결 백오프 단계 (초).
const RECONNECT_BACKOFF_SECS: [u64; 3] = [5, 30, 120];

/// 재연결 누적 한도 — 초과 시 장 마감으로 간주.
const MAX_RECONNECTS: u32 = 60;

/// 실시간 체결 프레임 파싱 (H0STCNT0 본문).
///
/// 필드: 0=종목코드, 1=체결시각, 2=현재가, 5=등락률, 13=누적거래량
pub fn parse_trade_payload(payload: &str) -> Option<RealtimeTrade> {
    let fields: Vec<&str> = payload.split('^').collect();
    if fields.len() < 14 {
        return None;
    }
    Some(RealtimeTrade {
        code: fields[0].to_string(),
        time: fields[1].to_string(),
        price: fields[2].parse().ok()?,
        change_rate: fields[5].parse().unwrap_or(0.0),
        cum_volume: fields[13].parse().unwrap_or(0),
    })
}

/// 실시간 호가 프레임 파싱 (H0STASP0 본문).
///
/// 필드: 0=종목코드, 1=호가시각,
/// 3..12=매도호가1~10, 13..22=매수호가1~10,
/// 23..32=매도잔량1~10, 33..42=매수잔량1~10,
/// 43=총매도잔량, 44=총매수잔량
pub fn parse_orderbook_payload(payload: &str) -> Option<RealtimeOrderbook> {
    let fields: Vec<&str> = payload.split('^').collect();
    if fields.len() < 45 {
        return None;
    }

    let mut asks = Vec::with_capacity(10);
    let mut bids = Vec::with_capacity(10);
    for i in 0..10 {
        let ask_price: i64 = fields[3 + i].parse().unwrap_or(0);
        if ask_price > 0 {
            asks.push(OrderbookLevel {
                price: ask_price,
                qty: fields[23 + i].parse().unwrap_or(0),
            });
        }
        let bid_price: i64 = fields[13 + i].parse().unwrap_or(0);
        if bid_price > 0 {
            bids.push(OrderbookLevel {
                price: bid_price,
                qty: fields[33 + i].parse().unwrap_or(0),
            });
        }
    }

    Some(RealtimeOrderbook {
        code: fields[0].to_string(),
        time: fields[1].to_string(),
        asks,
        bids,
        total_ask: fields[43].parse().unwrap_or(0),
        total_bid: fields[44].parse().unwrap_or(0),
    })
}

/// 데이터 프레임 1건 → 이벤트. 제어(JSON) 프레임은 None.
pub fn parse_frame(frame: &str) -> Option<RealtimeEvent> {
    if frame.starts_with('{') {
        return None; // 구독 ack / PINGPONG
    }
    let parts: Vec<&str> = frame.split('|').collect();
    if parts.len() < 4 {
        return None;
    }
    match parts[1] {
        tr_id::WS_TRADE => parse_trade_payload(parts[3]).map(RealtimeEvent::Trade),
        tr_id::WS_ORDERBOOK => parse_orderbook_payload(parts[3]).map(RealtimeEvent::Orderbook),
        _ => None,
    }
}

/// KIS 실시간 스트림 클라이언트.
pub struct KisTickStream {
    oauth: Arc<KisOAuth>,
    /// 체결 구독 종목
    trade_codes: Vec<String>,
    /// 호가 구독 종목
    orderbook_codes: Vec<String>,
}

impl KisTickStream {
    pub fn new(oauth: Arc<KisOAuth>, trade_codes: Vec<String>, orderbook_codes: Vec<String>) -> Self {
        Self {
            oauth,
            trade_codes,
            orderbook_codes,
        }
    }

    fn subscribe_message(approval_key: &str, tr: &str, code: &str, subscribe: bool) -> String {
        json!({
            "header": {
                "approval_key": approval_key,
                "custtype": "P",
                "tr_type": if subscribe { "1" } else { "2" },
                "content-type": "utf-8",
            },
            "body": {
                "input": { "tr_id": tr, "tr_key": code }
            }
        })
        .to_string()
    }

    /// 수신 루프 실행 — 이벤트를 채널로 흘린다.
    ///
    /// 단절 시 단계 백오프로 재연결하고, 한도 초과 시
    /// [`RealtimeEvent::Exhausted`]를 보내고 정상 종료한다.
    pub async fn run(&self, tx: mpsc::Sender<RealtimeEvent>) -> ExchangeResult<()> {
        let mut reconnects: u32 = 0;

        loop {
            match self.run_once(&tx).await {
                Ok(()) => {
                    info!("KIS WebSocket 정상 종료");
                    return Ok(());
                }
                Err(e) => {
                    reconnects += 1;
                    if reconnects > MAX_RECONNECTS {
                        warn!("재연결 한도({}회) 초과 — 장 마감으로 간주", MAX_RECONNECTS);
                        let _ = tx.send(RealtimeEvent::Exhausted).await;
                        return Ok(());
                    }

                    let stage =
                        RECONNECT_BACKOFF_SECS[(reconnects as usize - 1).min(RECONNECT_BACKOFF_SECS.len() - 1)];
                    error!(
                        "KIS WebSocket 에러: {} — {}초 후 재연결 ({}/{})",
                        e, stage, reconnects, MAX_RECONNECTS
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(stage)).await;
                    self.oauth.clear_websocket_key().await;
                }
            }
        }
    }

    async fn run_once(&self, tx: &mpsc::Sender<RealtimeEvent>) -> ExchangeResult<()> {
        let approval_key = self.oauth.get_websocket_key().await?;
        let ws_url = self.oauth.config().websocket_url();

        info!("KIS WebSocket 연결 중: {}", ws_url);
        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| ExchangeError::WebSocket(format!("연결 실패: {}", e)))?;

        let (mut write, mut read) = ws_stream.split();
        let _ = tx.send(RealtimeEvent::Connected(true)).await;
        info!("KIS WebSocket 연결 완료");

        // 구독 등록 (체결 + 호가)
        for code in &self.trade_codes {
            let msg = Self::subscribe_message(&approval_key, tr_id::WS_TRADE, code, true);
            write
                .send(Message::Text(msg))
                .await
                .map_err(|e| ExchangeError::WebSocket(e.to_string()))?;
            debug!("체결 구독: {}", code);
        }
        for code in &self.orderbook_codes {
            let msg = Self::subscribe_message(&approval_key, tr_id::WS_ORDERBOOK, code, true);
            write
                .send(Message::Text(msg))
                .await
                .map_err(|e| ExchangeError::WebSocket(e.to_string()))?;
            debug!("호가 구독: {}", code);
        }

        while let Some(message) = read.next().await {
            let message = message.map_err(|e| ExchangeError::WebSocket(e.to_string()))?;
            match message {
                Message::Text(text) => {
                    // PINGPONG 제어 메시지는 그대로 응답
                    if text.contains("PINGPONG") {
                        write
                            .send(Message::Text(text))
                            .await
                            .map_err(|e| ExchangeError::WebSocket(e.to_string()))?;
                        continue;
                    }
                    if let Some(event) = parse_frame(&text) {
                        if tx.send(event).await.is_err() {
                            // 수신측 종료 — 정상 종료 처리
                            return Ok(());
                        }
                    }
                }
                Message::Ping(data) => {
                    write
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| ExchangeError::WebSocket(e.to_string()))?;
                }
                Message::Close(_) => {
                    let _ = tx.send(RealtimeEvent::Connected(false)).await;
                    return Err(ExchangeError::WebSocket("서버 연결 종료".to_string()));
                }
                _ => {}
            }
        }

        let _ = tx.send(RealtimeEvent::Connected(false)).await;
        Err(ExchangeError::WebSocket("스트림 종료".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trade_payload() {
        // 0=코드 1=시각 2=현재가 5=등락률 13=누적거래량
        let payload = "005930^101530^70000^2^1700^2.49^69500^69000^70100^70200^69900^1^100^123456^x^y";
        let trade = parse_trade_payload(payload).unwrap();
        assert_eq!(trade.code, "005930");
        assert_eq!(trade.time, "101530");
        assert_eq!(trade.price, 70_000);
        assert_eq!(trade.change_rate, 2.49);
        assert_eq!(trade.cum_volume, 123_456);
    }

    #[test]
    fn test_parse_trade_payload_short_frame() {
        assert!(parse_trade_payload("005930^1015").is_none());
    }

    #[test]
    fn test_parse_orderbook_payload() {
        let mut fields = vec!["0".to_string(); 50];
        fields[0] = "005930".to_string();
        fields[1] = "101530".to_string();
        // 매도호가 1~3단
        fields[3] = "70100".to_string();
        fields[4] = "70200".to_string();
        fields[5] = "70300".to_string();
        // 매수호가 1단
        fields[13] = "70000".to_string();
        // 매도잔량 1~3단
        fields[23] = "100".to_string();
        fields[24] = "200".to_string();
        fields[25] = "300".to_string();
        // 매수잔량 1단
        fields[33] = "500".to_string();
        fields[43] = "600".to_string();
        fields[44] = "500".to_string();

        let ob = parse_orderbook_payload(&fields.join("^")).unwrap();
        assert_eq!(ob.code, "005930");
        assert_eq!(ob.asks.len(), 3);
        assert_eq!(ob.asks[0].price, 70_100);
        assert_eq!(ob.asks[0].qty, 100);
        assert_eq!(ob.bids.len(), 1);
        assert_eq!(ob.total_ask, 600);
        assert_eq!(ob.total_bid, 500);
    }

    #[test]
    fn test_parse_frame_dispatch() {
        // JSON 제어 프레임 무시
        assert!(parse_frame(r#"{"header":{"tr_id":"PINGPONG"}}"#).is_none());

        // 체결 프레임
        let payload = "005930^101530^70000^2^1700^2.49^a^b^c^d^e^f^g^123456";
        let frame = format!("0|H0STCNT0|001|{}", payload);
        assert!(matches!(parse_frame(&frame), Some(RealtimeEvent::Trade(_))));

        // 미지 TR
        let frame = format!("0|H0STXXX0|001|{}", payload);
        assert!(parse_frame(&frame).is_none());
    }
}
