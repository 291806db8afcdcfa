use crate::error::AppError;
use crate::llm::gemini::GeminiConfig;
use serde::Serialize;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_APPRAISAL_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_INTERPRETATION_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_SPEECH_VOICE: &str = "Kore";
pub const DEFAULT_DNS_RESOLVER_URL: &str = "https://dns.google/resolve";

/// Process-level configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub gemini_base_url: String,
    pub appraisal_model: String,
    pub interpretation_model: String,
    pub speech_model: String,
    pub speech_voice: String,
    pub dns_resolver_url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyStatus {
    pub configured: bool,
    pub masked: Option<String>,
}

impl AppConfig {
    /// Loads `.env` (if present) and then reads the process environment.
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("Ignoring unreadable .env file: {}", e);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            api_key: lookup("API_KEY")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            gemini_base_url: read("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            appraisal_model: read("APPRAISAL_MODEL", DEFAULT_APPRAISAL_MODEL),
            interpretation_model: read("INTERPRETATION_MODEL", DEFAULT_INTERPRETATION_MODEL),
            speech_model: read("SPEECH_MODEL", DEFAULT_SPEECH_MODEL),
            speech_voice: read("SPEECH_VOICE", DEFAULT_SPEECH_VOICE),
            dns_resolver_url: read("DNS_RESOLVER_URL", DEFAULT_DNS_RESOLVER_URL),
        }
    }

    /// Connection settings for the model API, or a configuration error when
    /// no credential was supplied.
    pub fn gemini(&self) -> Result<GeminiConfig, AppError> {
        let api_key = self.api_key.clone().ok_or(AppError::MissingApiKey)?;
        Ok(GeminiConfig {
            api_key,
            base_url: self.gemini_base_url.clone(),
        })
    }

    pub fn api_key_status(&self) -> ApiKeyStatus {
        match &self.api_key {
            Some(key) => ApiKeyStatus {
                configured: true,
                masked: Some(mask_key(key)),
            },
            None => ApiKeyStatus {
                configured: false,
                masked: None,
            },
        }
    }
}

fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{}***", prefix)
}
