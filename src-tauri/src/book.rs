use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const INTERPRETATION_INSTRUCTION: &str =
    "이 고서를 판독하고 번역하여 해설을 제공해 주십시오.";

/// Transcription, translation and commentary of a photographed old document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookInterpretation {
    #[serde(default)]
    pub original_text: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default)]
    pub commentary: String,
    #[serde(default)]
    pub era: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_note: Option<String>,
}

impl BookInterpretation {
    /// What gets read aloud.
    pub fn speech_text(&self) -> String {
        format!("{}. {}", self.translation, self.commentary)
    }
}

/// Response schema the model is constrained to.
pub fn interpretation_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "originalText": { "type": "STRING" },
            "translation": { "type": "STRING" },
            "commentary": { "type": "STRING" },
            "era": { "type": "STRING" },
            "authorNote": { "type": "STRING" }
        },
        "required": ["originalText", "translation", "commentary", "era"]
    })
}

/// Parses the structured answer. Anything that is not a JSON object is kept
/// as plain commentary rather than reported as an error.
pub fn parse_interpretation(raw: &str) -> BookInterpretation {
    let body = strip_code_fence(raw.trim());
    match serde_json::from_str::<BookInterpretation>(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("Interpretation did not match the schema, keeping raw text: {}", e);
            BookInterpretation {
                commentary: raw.trim().to_string(),
                ..Default::default()
            }
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop an info string such as `json` on the opening fence line.
    match inner.split_once('\n') {
        Some((first, rest)) if !first.trim_start().starts_with('{') => rest.trim(),
        _ => inner.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schema_response() {
        let raw = r#"{"originalText":"學而時習之","translation":"배우고 때때로 익히면","commentary":"논어 첫 구절","era":"조선 후기"}"#;
        let parsed = parse_interpretation(raw);
        assert_eq!(parsed.original_text, "學而時習之");
        assert_eq!(parsed.era, "조선 후기");
        assert_eq!(parsed.author_note, None);
    }

    #[test]
    fn fenced_json_is_accepted() {
        let raw = "```json\n{\"translation\":\"t\",\"commentary\":\"c\",\"authorNote\":\"n\"}\n```";
        let parsed = parse_interpretation(raw);
        assert_eq!(parsed.translation, "t");
        assert_eq!(parsed.author_note.as_deref(), Some("n"));
        assert_eq!(parsed.original_text, "");
    }

    #[test]
    fn prose_falls_back_to_commentary() {
        let parsed = parse_interpretation("  The page is too faded to read.  ");
        assert_eq!(parsed.commentary, "The page is too faded to read.");
        assert_eq!(parsed.translation, "");
    }

    #[test]
    fn speech_joins_translation_and_commentary() {
        let parsed = BookInterpretation {
            translation: "Learn and practise".into(),
            commentary: "Opening of the Analects".into(),
            ..Default::default()
        };
        assert_eq!(parsed.speech_text(), "Learn and practise. Opening of the Analects");
    }

    #[test]
    fn schema_requires_core_fields() {
        let schema = interpretation_schema();
        assert_eq!(schema["required"].as_array().map(Vec::len), Some(4));
        assert_eq!(schema["properties"]["authorNote"]["type"], "STRING");
    }
}
