pub mod gemini;

use serde::{Deserialize, Serialize};

/// Raw bytes (base64) plus a declared media type, passed inline to the model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline(inline_data: InlineData) -> Self {
        Part::Inline { inline_data }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One conversational turn sent to the model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Content {
            role: Role::User,
            parts,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Content {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Request blocked by the model: {0}")]
    Blocked(String),
}

impl Serialize for LlmError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parts_serialize_in_wire_shape() {
        let content = Content::user(vec![
            Part::inline(InlineData {
                mime_type: "image/png".into(),
                data: "AAAA".into(),
            }),
            Part::text("a celadon vase"),
        ]);
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": "AAAA" } },
                    { "text": "a celadon vase" }
                ]
            })
        );
    }
}
