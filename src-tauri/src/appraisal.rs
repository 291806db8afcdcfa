//! Appraisal certificates embedded in the curator's free-text answer.
//!
//! The model is asked to finish its narrative with a JSON object of the form
//! `{"certificate": {...}}`. The object is located with a greedy match from
//! the first `{` that can start a match to the last `}` of the text, so stray
//! braces in the prose around it can widen the span and make parsing fail.
//! Any failure falls back to treating the whole answer as narrative.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

static CERTIFICATE_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)\{.*"certificate".*\}"#).expect("valid regex"));

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Rarity {
    #[serde(rename = "National Treasure Level")]
    NationalTreasure,
    Rare,
    Fine,
    Common,
}

impl Rarity {
    /// Accepts the English tier names and the Korean ones the prompt offers.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        match value.to_lowercase().as_str() {
            "national treasure level" | "national treasure" | "국보급" => {
                Some(Rarity::NationalTreasure)
            }
            "rare" | "희귀" => Some(Rarity::Rare),
            "fine" | "정교함" => Some(Rarity::Fine),
            "common" | "보통" => Some(Rarity::Common),
            _ => None,
        }
    }
}

fn lenient_rarity<'de, D>(deserializer: D) -> Result<Option<Rarity>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_str).and_then(Rarity::parse))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppraisalCertificate {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub item_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub period: String,
    #[serde(default, deserialize_with = "lenient_rarity")]
    pub rarity: Option<Rarity>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub estimated_value: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub summary: String,
}

/// Narrative text with the certificate removed, plus the certificate if one
/// was found and parsed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub narrative: String,
    pub certificate: Option<AppraisalCertificate>,
}

#[derive(Deserialize)]
struct Envelope {
    certificate: Value,
}

/// Splits a model answer into narrative and certificate. Never fails.
pub fn extract_certificate(text: &str) -> Extraction {
    let fallback = || Extraction {
        narrative: text.to_string(),
        certificate: None,
    };

    let Some(span) = CERTIFICATE_SPAN.find(text) else {
        return fallback();
    };

    let certificate = match serde_json::from_str::<Envelope>(span.as_str()) {
        Ok(Envelope {
            certificate: cert @ Value::Object(_),
        }) => serde_json::from_value::<AppraisalCertificate>(cert),
        Ok(_) => {
            log::warn!("Certificate member is not an object; using raw text");
            return fallback();
        }
        Err(e) => {
            log::warn!("Certificate JSON parsing failed, using raw text: {}", e);
            return fallback();
        }
    };

    match certificate {
        Ok(certificate) => {
            let mut narrative = String::with_capacity(text.len() - span.len());
            narrative.push_str(&text[..span.start()]);
            narrative.push_str(&text[span.end()..]);
            Extraction {
                narrative: narrative.trim().to_string(),
                certificate: Some(certificate),
            }
        }
        Err(e) => {
            log::warn!("Certificate fields unreadable, using raw text: {}", e);
            fallback()
        }
    }
}

/// A fresh `CERT-nnnnnn` identifier.
pub fn new_certificate_id() -> String {
    let n = uuid::Uuid::new_v4().as_u128() % 900_000 + 100_000;
    format!("CERT-{}", n)
}

/// Curator instructions appended after the user's photos and notes.
pub fn appraisal_prompt(certificate_id: &str) -> String {
    format!(
        r#"당신은 황실 유물 감정소의 수석 큐레이터 '고산'입니다.
사용자가 올린 유물을 정밀하게 살펴보고, 품격 있는 구어체로 내력과 특징을 설명해 주십시오.
설명의 마지막에는 반드시 아래 형식의 JSON 객체를 한 번만 포함하십시오:
{{
  "certificate": {{
    "id": "{certificate_id}",
    "itemName": "유물 명칭",
    "period": "추정 시기",
    "rarity": "희귀도 (국보급/희귀/정교함/보통 중 택1)",
    "estimatedValue": "추정 감정가",
    "summary": "유물의 가치를 담은 한 줄 요약"
  }}
}}"#
    )
}
