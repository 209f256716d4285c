//! Gemini REST 클라이언트.
//!
//! - 모델 폴백 목록을 순서대로 시도하고 첫 성공 응답을 쓴다
//! - 응답 JSON은 마크다운 펜스·후위 잘림을 관대하게 복구한다
//! - API 키가 없으면 비활성 — 호출부는 단계별 기본값으로 degrade

use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use stockbot_core::{BotError, BotResult};

/// 모델 폴백 우선순위.
const MODEL_FALLBACK: [&str; 2] = ["gemini-2.5-flash", "gemini-2.0-flash"];

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini 클라이언트.
pub struct GeminiClient {
    api_key: Option<SecretString>,
    client: reqwest::Client,
    models: Vec<String>,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<SecretString>) -> Self {
        if api_key.is_none() {
            warn!("GOOGLE_AI_API_KEY 없음 — AI 분석 비활성");
        } else {
            info!("Gemini 클라이언트 초기화 완료 (폴백 모델 적용)");
        }
        Self {
            api_key,
            client: reqwest::Client::new(),
            models: MODEL_FALLBACK.iter().map(|m| m.to_string()).collect(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// 테스트용 기본 URL 재정의.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 테스트용 모델 목록 재정의.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// 클라이언트 사용 가능 여부.
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// 프롬프트 1건 생성 호출. 모델 폴백 목록 소진 시 에러.
    pub async fn generate(&self, prompt: &str, max_tokens: u32) -> BotResult<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| BotError::Analysis("AI 클라이언트 미초기화".to_string()))?;

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.2,
                "maxOutputTokens": max_tokens,
            }
        });

        let mut last_error = None;
        for model in &self.models {
            let url = format!(
                "{}/v1beta/models/{}:generateContent?key={}",
                self.base_url,
                model,
                api_key.expose_secret()
            );

            let result = self.client.post(&url).json(&body).send().await;
            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!("{} 호출 실패: {} — 다음 모델 시도", model, e);
                    last_error = Some(BotError::Network(e.to_string()));
                    continue;
                }
            };

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| BotError::Network(e.to_string()))?;

            if !status.is_success() {
                warn!("{} 응답 에러 {}: — 다음 모델 시도", model, status);
                last_error = Some(BotError::Analysis(format!("{}: {}", status, text)));
                continue;
            }

            match extract_text(&text) {
                Some(generated) => {
                    debug!(model = %model, chars = generated.len(), "생성 완료");
                    return Ok(generated);
                }
                None => {
                    warn!("{} 응답에 텍스트 없음 — 다음 모델 시도", model);
                    last_error = Some(BotError::Analysis("빈 응답".to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BotError::Analysis("모델 폴백 소진".to_string())))
    }
}

/// generateContent 응답에서 텍스트 추출.
fn extract_text(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let text = value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()?;
    Some(text.to_string())
}

/// AI 응답에서 JSON 추출 (마크다운 펜스 제거 포함).
///
/// `json.loads` 실패 시 끝에서부터 닫는 괄호 경계까지 잘라내며 재시도한다
/// (max_tokens로 잘린 후위 대응).
pub fn extract_json(raw: &str) -> BotResult<Value> {
    let cleaned = raw
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string();

    let start = cleaned
        .char_indices()
        .find(|(_, c)| *c == '[' || *c == '{')
        .map(|(i, _)| i)
        .ok_or_else(|| BotError::Serialization(format!("JSON 없음: {}", truncate(&cleaned, 80))))?;

    let json_str = &cleaned[start..];
    let closer = if json_str.starts_with('[') { ']' } else { '}' };
    let json_str = match json_str.rfind(closer) {
        Some(end) => &json_str[..=end],
        None => json_str,
    };

    if let Ok(value) = serde_json::from_str(json_str) {
        return Ok(value);
    }

    // 후위 잘림 대응: 마지막 완전한 JSON 경계까지 잘라내며 재시도
    for (i, c) in json_str.char_indices().rev() {
        if c != '}' && c != ']' {
            continue;
        }
        if let Ok(value) = serde_json::from_str(&json_str[..=i]) {
            return Ok(value);
        }
    }

    Err(BotError::Serialization(format!(
        "JSON 파싱 실패: {}",
        truncate(json_str, 80)
    )))
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
