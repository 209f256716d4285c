//! KIS API 설정 — 환경(모의/실전)별 URL·거래 ID 테이블.

use secrecy::{ExposeSecret, SecretString};
use stockbot_core::{KisCredentials, TradingMode};

/// 환경별 거래 ID.
pub mod tr_id {
    /// 현재가 조회 (공통)
    pub const PRICE: &str = "FHKST01010100";
    /// 호가 조회 (공통)
    pub const ORDERBOOK: &str = "FHKST01010200";
    /// 거래량 순위 (공통)
    pub const VOLUME_RANK: &str = "FHPST01710000";
    /// 등락률 순위 (공통)
    pub const CHANGE_RANK: &str = "FHPST01700000";
    /// 실시간 체결
    pub const WS_TRADE: &str = "H0STCNT0";
    /// 실시간 호가
    pub const WS_ORDERBOOK: &str = "H0STASP0";

    /// 시장가 매수 (모의/실전)
    pub fn buy(env: super::KisEnvironment) -> &'static str {
        match env {
            super::KisEnvironment::Paper => "VTTC0012U",
            super::KisEnvironment::Real => "TTTC0012U",
        }
    }

    /// 시장가 매도 (모의/실전)
    pub fn sell(env: super::KisEnvironment) -> &'static str {
        match env {
            super::KisEnvironment::Paper => "VTTC0011U",
            super::KisEnvironment::Real => "TTTC0011U",
        }
    }

    /// 잔고 조회 (모의/실전)
    pub fn balance(env: super::KisEnvironment) -> &'static str {
        match env {
            super::KisEnvironment::Paper => "VTTC8434R",
            super::KisEnvironment::Real => "TTTC8434R",
        }
    }
}

/// KIS API 환경.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KisEnvironment {
    /// 모의투자
    #[default]
    Paper,
    /// 실전투자
    Real,
}

impl KisEnvironment {
    pub fn from_mode(mode: TradingMode) -> Self {
        match mode {
            TradingMode::Vts => KisEnvironment::Paper,
            TradingMode::Real => KisEnvironment::Real,
        }
    }

    /// REST API 기본 URL.
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            KisEnvironment::Real => "https://openapi.koreainvestment.com:9443",
            KisEnvironment::Paper => "https://openapivts.koreainvestment.com:29443",
        }
    }

    /// WebSocket URL.
    pub fn websocket_url(&self) -> &'static str {
        match self {
            KisEnvironment::Real => "ws://ops.koreainvestment.com:21000",
            KisEnvironment::Paper => "ws://ops.koreainvestment.com:31000",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            KisEnvironment::Real => "REAL",
            KisEnvironment::Paper => "VTS",
        }
    }
}

/// KIS API 설정.
#[derive(Clone)]
pub struct KisConfig {
    pub environment: KisEnvironment,
    pub app_key: String,
    pub app_secret: SecretString,
    /// 계좌번호 (CANO)
    pub account_no: String,
    /// 계좌상품코드 (ACNT_PRDT_CD)
    pub account_code: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// REST 기본 URL 재정의 (테스트용)
    pub rest_base_override: Option<String>,
}

impl std::fmt::Debug for KisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KisConfig")
            .field("environment", &self.environment)
            .field("app_key", &format!("{}...", &self.app_key.chars().take(8).collect::<String>()))
            .field("account_no", &self.account_no)
            .finish_non_exhaustive()
    }
}

impl KisConfig {
    /// 자격증명 + 환경으로 설정 생성.
    pub fn from_credentials(creds: &KisCredentials, environment: KisEnvironment) -> Self {
        Self {
            environment,
            app_key: creds.app_key.clone(),
            app_secret: SecretString::from(creds.app_secret_str().to_string()),
            account_no: creds.account_no.clone(),
            account_code: creds.account_code.clone(),
            timeout_secs: 10,
            rest_base_override: None,
        }
    }

    /// REST 기본 URL (재정의가 있으면 그쪽).
    pub fn rest_base_url(&self) -> String {
        self.rest_base_override
            .clone()
            .unwrap_or_else(|| self.environment.rest_base_url().to_string())
    }

    pub fn websocket_url(&self) -> &'static str {
        self.environment.websocket_url()
    }

    pub fn app_secret_str(&self) -> &str {
        self.app_secret.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_urls() {
        assert_eq!(
            KisEnvironment::Real.rest_base_url(),
            "https://openapi.koreainvestment.com:9443"
        );
        assert_eq!(
            KisEnvironment::Paper.rest_base_url(),
            "https://openapivts.koreainvestment.com:29443"
        );
        assert_eq!(
            KisEnvironment::Paper.websocket_url(),
            "ws://ops.koreainvestment.com:31000"
        );
    }

    #[test]
    fn test_tr_id_by_environment() {
        assert_eq!(tr_id::buy(KisEnvironment::Paper), "VTTC0012U");
        assert_eq!(tr_id::buy(KisEnvironment::Real), "TTTC0012U");
        assert_eq!(tr_id::sell(KisEnvironment::Paper), "VTTC0011U");
        assert_eq!(tr_id::balance(KisEnvironment::Real), "TTTC8434R");
    }

    #[test]
    fn test_environment_from_mode() {
        assert_eq!(KisEnvironment::from_mode(TradingMode::Vts), KisEnvironment::Paper);
        assert_eq!(KisEnvironment::from_mode(TradingMode::Real), KisEnvironment::Real);
    }
}
