//! 환경 변수 기반 설정.
//!
//! 모든 설정은 환경 변수에서 읽는다 (`.env` 지원).
//! 실전(REAL) 모드에서는 KIS 실전 키가 반드시 있어야 한다.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{BotError, BotResult};

/// 매매 모드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TradingMode {
    /// 모의투자
    #[serde(rename = "VTS")]
    #[default]
    Vts,
    /// 실전투자
    #[serde(rename = "REAL")]
    Real,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Vts => "VTS",
            TradingMode::Real => "REAL",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "REAL" => TradingMode::Real,
            _ => TradingMode::Vts,
        }
    }

    /// 모드별 KIS REST 요청 한도 (초당).
    ///
    /// 실전은 공식 20회에서 여유 1회를 뺀 19회, 모의는 2회.
    pub fn rate_limit_per_sec(&self) -> u32 {
        match self {
            TradingMode::Vts => 2,
            TradingMode::Real => 19,
        }
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// KIS 계정 자격증명 한 벌 (실전 또는 모의).
#[derive(Debug, Clone)]
pub struct KisCredentials {
    pub app_key: String,
    pub app_secret: SecretString,
    pub account_no: String,
    pub account_code: String,
}

impl KisCredentials {
    fn from_env(prefix: &str) -> Option<Self> {
        let app_key = std::env::var(format!("{}APP_KEY", prefix)).ok()?;
        let app_secret = std::env::var(format!("{}APP_SECRET", prefix)).ok()?;
        let account_no = std::env::var(format!("{}ACCOUNT_NO", prefix)).ok()?;
        let account_code =
            std::env::var(format!("{}ACCOUNT_CODE", prefix)).unwrap_or_else(|_| "01".to_string());
        Some(Self {
            app_key,
            app_secret: SecretString::from(app_secret),
            account_no,
            account_code,
        })
    }

    pub fn app_secret_str(&self) -> &str {
        self.app_secret.expose_secret()
    }
}

/// 장중 감시 임계값.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// 폴링 간격 (초)
    pub poll_interval_sec: u64,
    /// 급등모멘텀: 1분 추가 등락률 하한 (%)
    pub price_delta_min: f64,
    /// 급등모멘텀: 1분 거래량 증가율 하한 (%)
    pub volume_delta_min: f64,
    /// 급등모멘텀: 연속 확인 횟수
    pub confirm_candles: u32,
    /// 매수벽 검사 최소 등락률 (%)
    pub min_change_rate: f64,
    /// 호가 분석 활성화
    pub orderbook_enabled: bool,
    /// 호가 강세 판정: 매수/매도 비율 상한 기준
    pub orderbook_bid_ask_good: f64,
    /// 호가 강세 판정: 매수/매도 비율 하한 기준
    pub orderbook_bid_ask_min: f64,
    /// 호가 강세 판정: 매도 상위3 집중도 기준
    pub orderbook_top3_ratio_min: f64,
    /// WebSocket 감시 활성화
    pub ws_enabled: bool,
    /// WebSocket 총 구독 한도 (체결+호가)
    pub ws_watchlist_max: usize,
}

/// 포지션·청산 임계값.
#[derive(Debug, Clone)]
pub struct PositionConfig {
    /// 1회 매수 금액 (원)
    pub buy_amount: i64,
    /// 강세장 동시 보유 한도
    pub max_bull: i64,
    /// 약세장/횡보 동시 보유 한도
    pub max_bear: i64,
    /// 그 외 동시 보유 한도
    pub max_neutral: i64,
    /// 당일 손실 한도 (%, 음수) — 도달 시 신규 매수 차단
    pub daily_loss_limit: f64,
    /// 1차 익절 기준 (%)
    pub take_profit_1: f64,
    /// 2차 익절 기준 (%)
    pub take_profit_2: f64,
    /// 손절 기준 (%, 음수)
    pub stop_loss: f64,
}

/// 애플리케이션 전체 설정.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub trading_mode: TradingMode,
    pub auto_trade_enabled: bool,
    pub real_mode_confirm_enabled: bool,
    pub real_mode_confirm_delay_sec: u64,

    pub db_path: String,

    pub telegram_token: Option<SecretString>,
    pub telegram_chat_id: Option<String>,

    pub google_ai_api_key: Option<SecretString>,

    /// 실전 자격증명 (KIS_*)
    pub kis_real: Option<KisCredentials>,
    /// 모의 자격증명 (KIS_VTS_*)
    pub kis_vts: Option<KisCredentials>,

    pub watch: WatchConfig,
    pub position: PositionConfig,

    /// 수집기 개별 타임아웃 (초)
    pub collector_timeout_sec: u64,
    /// 아침봇 캐시 허용 나이 (분)
    pub cache_max_age_min: i64,
    /// 기억 압축 배치 활성화
    pub memory_compress_enabled: bool,
    /// 테마 이력 기록 활성화
    pub theme_history_enabled: bool,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

impl AppConfig {
    /// 환경 변수에서 설정을 읽는다. `.env` 파일이 있으면 먼저 로드한다.
    pub fn from_env() -> BotResult<Self> {
        let _ = dotenvy::dotenv();

        let trading_mode = TradingMode::parse(&env_or("TRADING_MODE", "VTS"));

        let config = Self {
            trading_mode,
            auto_trade_enabled: env_flag("AUTO_TRADE_ENABLED", false),
            real_mode_confirm_enabled: env_flag("REAL_MODE_CONFIRM_ENABLED", true),
            real_mode_confirm_delay_sec: env_parse_or("REAL_MODE_CONFIRM_DELAY_SEC", 300u64),

            db_path: env_or("DB_PATH", "data/stockbot.db"),

            telegram_token: std::env::var("TELEGRAM_TOKEN").ok().map(SecretString::from),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),

            google_ai_api_key: std::env::var("GOOGLE_AI_API_KEY")
                .ok()
                .filter(|v| !v.is_empty())
                .map(SecretString::from),

            kis_real: KisCredentials::from_env("KIS_"),
            kis_vts: KisCredentials::from_env("KIS_VTS_"),

            watch: WatchConfig {
                poll_interval_sec: env_parse_or("POLL_INTERVAL_SEC", 30u64),
                price_delta_min: env_parse_or("PRICE_DELTA_MIN", 1.0f64),
                volume_delta_min: env_parse_or("VOLUME_DELTA_MIN", 30.0f64),
                confirm_candles: env_parse_or("CONFIRM_CANDLES", 2u32),
                min_change_rate: env_parse_or("MIN_CHANGE_RATE", 3.0f64),
                orderbook_enabled: env_flag("ORDERBOOK_ENABLED", true),
                orderbook_bid_ask_good: env_parse_or("ORDERBOOK_BID_ASK_GOOD", 2.0f64),
                orderbook_bid_ask_min: env_parse_or("ORDERBOOK_BID_ASK_MIN", 1.3f64),
                orderbook_top3_ratio_min: env_parse_or("ORDERBOOK_TOP3_RATIO_MIN", 0.5f64),
                ws_enabled: env_flag("WS_ENABLED", false),
                ws_watchlist_max: env_parse_or("WS_WATCHLIST_MAX", 40usize),
            },
            position: PositionConfig {
                buy_amount: env_parse_or("POSITION_BUY_AMOUNT", 1_000_000i64),
                max_bull: env_parse_or("POSITION_MAX_BULL", 5i64),
                max_bear: env_parse_or("POSITION_MAX_BEAR", 2i64),
                max_neutral: env_parse_or("POSITION_MAX_NEUTRAL", 3i64),
                daily_loss_limit: env_parse_or("DAILY_LOSS_LIMIT", -3.0f64),
                take_profit_1: env_parse_or("TAKE_PROFIT_1", 5.0f64),
                take_profit_2: env_parse_or("TAKE_PROFIT_2", 10.0f64),
                stop_loss: env_parse_or("STOP_LOSS", -3.0f64),
            },

            collector_timeout_sec: env_parse_or("COLLECTOR_TIMEOUT_SEC", 60u64),
            cache_max_age_min: env_parse_or("CACHE_MAX_AGE_MIN", 180i64),
            memory_compress_enabled: env_flag("MEMORY_COMPRESS_ENABLED", true),
            theme_history_enabled: env_flag("THEME_HISTORY_ENABLED", true),
        };

        config.validate()?;
        Ok(config)
    }

    /// 모드별 필수 설정 검증.
    fn validate(&self) -> BotResult<()> {
        if self.trading_mode == TradingMode::Real {
            if self.kis_real.is_none() {
                return Err(BotError::Config(
                    "REAL 모드에는 KIS_APP_KEY/KIS_APP_SECRET/KIS_ACCOUNT_NO가 필요합니다"
                        .to_string(),
                ));
            }
            if self.telegram_token.is_none() || self.telegram_chat_id.is_none() {
                return Err(BotError::Config(
                    "REAL 모드에는 TELEGRAM_TOKEN/TELEGRAM_CHAT_ID가 필요합니다".to_string(),
                ));
            }
        }
        if self.position.daily_loss_limit >= 0.0 {
            return Err(BotError::Config(
                "DAILY_LOSS_LIMIT은 음수여야 합니다".to_string(),
            ));
        }
        if self.position.stop_loss >= 0.0 {
            return Err(BotError::Config("STOP_LOSS는 음수여야 합니다".to_string()));
        }
        Ok(())
    }

    /// 현재 매매 모드의 자격증명.
    pub fn active_credentials(&self) -> Option<&KisCredentials> {
        match self.trading_mode {
            TradingMode::Vts => self.kis_vts.as_ref(),
            TradingMode::Real => self.kis_real.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trading_mode_parse() {
        assert_eq!(TradingMode::parse("REAL"), TradingMode::Real);
        assert_eq!(TradingMode::parse("real"), TradingMode::Real);
        assert_eq!(TradingMode::parse("VTS"), TradingMode::Vts);
        assert_eq!(TradingMode::parse("anything"), TradingMode::Vts);
    }

    #[test]
    fn test_rate_limit_by_mode() {
        assert_eq!(TradingMode::Vts.rate_limit_per_sec(), 2);
        assert_eq!(TradingMode::Real.rate_limit_per_sec(), 19);
    }
}
