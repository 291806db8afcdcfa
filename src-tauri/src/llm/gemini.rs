use super::{Content, InlineData, LlmError, Part, StreamChunk};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest text handed to the speech model in one request.
pub const SPEECH_TEXT_LIMIT: usize = 500;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    /// Concatenated non-thought text of the first candidate.
    fn text(&self) -> String {
        self.parts()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text.as_deref())
            .collect()
    }

    fn inline_data(&self) -> Option<&InlineData> {
        self.parts().find_map(|p| p.inline_data.as_ref())
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }
}

fn endpoint(config: &GeminiConfig, model: &str, action: &str) -> String {
    format!("{}/models/{}:{}", config.base_url, model, action)
}

async fn send(
    config: &GeminiConfig,
    model: &str,
    action: &str,
    body: &GenerateRequest<'_>,
    stream: bool,
) -> Result<reqwest::Response, LlmError> {
    let client = Client::new();
    let mut req = client
        .post(endpoint(config, model, action))
        .header("Content-Type", "application/json")
        .header("x-goog-api-key", &config.api_key)
        .json(body);

    if stream {
        req = req.query(&[("alt", "sse")]);
    }

    let resp = req.send().await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status,
            message: text,
        });
    }

    Ok(resp)
}

async fn generate_response(
    config: &GeminiConfig,
    model: &str,
    body: &GenerateRequest<'_>,
) -> Result<GenerateResponse, LlmError> {
    let resp = send(config, model, "generateContent", body, false).await?;
    let data: GenerateResponse = resp
        .json()
        .await
        .map_err(|e| LlmError::Parse(e.to_string()))?;

    if let Some(reason) = data.block_reason() {
        return Err(LlmError::Blocked(reason.to_string()));
    }
    Ok(data)
}

/// Single-shot generation returning the model's free-form text.
pub async fn generate(
    config: &GeminiConfig,
    model: &str,
    contents: &[Content],
) -> Result<String, LlmError> {
    let body = GenerateRequest {
        contents,
        generation_config: None,
    };
    let text = generate_response(config, model, &body).await?.text();
    if text.trim().is_empty() {
        return Err(LlmError::Parse("model returned no text".into()));
    }
    Ok(text)
}

/// Generation constrained to a JSON response schema. Returns the raw JSON text;
/// callers decide how to recover from a response that does not match.
pub async fn generate_json(
    config: &GeminiConfig,
    model: &str,
    contents: &[Content],
    schema: Value,
) -> Result<String, LlmError> {
    let body = GenerateRequest {
        contents,
        generation_config: Some(GenerationConfig {
            response_mime_type: Some("application/json".into()),
            response_schema: Some(schema),
            ..Default::default()
        }),
    };
    Ok(generate_response(config, model, &body).await?.text())
}

/// Streams text deltas through `on_chunk` and returns the full text.
pub async fn generate_stream(
    config: &GeminiConfig,
    model: &str,
    contents: &[Content],
    on_chunk: impl Fn(StreamChunk) + Send,
) -> Result<String, LlmError> {
    let body = GenerateRequest {
        contents,
        generation_config: None,
    };
    let resp = send(config, model, "streamGenerateContent", &body, true).await?;
    collect_stream(resp.bytes_stream(), on_chunk).await
}

/// Drains an SSE byte stream, forwarding each text delta and returning the
/// concatenated text.
async fn collect_stream<S, B, E>(
    stream: S,
    on_chunk: impl Fn(StreamChunk) + Send,
) -> Result<String, LlmError>
where
    S: futures::Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    LlmError: From<E>,
{
    let mut stream = std::pin::pin!(stream);
    let mut full_content = String::new();
    let mut lines = LineBuffer::default();
    let mut forward = |line: &str| -> Result<(), LlmError> {
        if let Some(delta) = parse_sse_line(line)? {
            if !delta.is_empty() {
                full_content.push_str(&delta);
                on_chunk(StreamChunk { delta, done: false });
            }
        }
        Ok(())
    };

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for line in lines.push(chunk.as_ref()) {
            forward(&line)?;
        }
    }
    forward(&lines.finish())?;

    on_chunk(StreamChunk {
        delta: String::new(),
        done: true,
    });

    if full_content.trim().is_empty() {
        return Err(LlmError::Parse("model returned no text".into()));
    }
    Ok(full_content)
}

/// Accumulates raw bytes and yields complete lines. Bytes are decoded only
/// once a newline closes the line, so a code point split across network
/// chunks survives intact.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim().to_string());
        }
        lines
    }

    fn finish(self) -> String {
        String::from_utf8_lossy(&self.pending).trim().to_string()
    }
}

/// Text carried by one `data:` line of the event stream. Unparseable events
/// are skipped; a blocked prompt is an error.
fn parse_sse_line(line: &str) -> Result<Option<String>, LlmError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    match serde_json::from_str::<GenerateResponse>(data.trim()) {
        Ok(event) => {
            if let Some(reason) = event.block_reason() {
                return Err(LlmError::Blocked(reason.to_string()));
            }
            Ok(Some(event.text()))
        }
        Err(e) => {
            log::debug!("Skipping unparseable stream event: {}", e);
            Ok(None)
        }
    }
}

/// Requests spoken audio for `text`. Returns the base64 payload of headerless
/// 16-bit / 24 kHz mono PCM, or `None` when the model answered without audio.
pub async fn synthesize_speech(
    config: &GeminiConfig,
    model: &str,
    voice: &str,
    text: &str,
) -> Result<Option<String>, LlmError> {
    let contents = [Content::user(vec![Part::text(truncate_chars(
        text,
        SPEECH_TEXT_LIMIT,
    ))])];
    let body = GenerateRequest {
        contents: &contents,
        generation_config: Some(speech_generation_config(voice)),
    };
    let data = generate_response(config, model, &body).await?;
    Ok(data.inline_data().map(|d| d.data.clone()))
}

fn speech_generation_config(voice: &str) -> GenerationConfig {
    GenerationConfig {
        response_modalities: Some(vec!["AUDIO".into()]),
        speech_config: Some(SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice.to_string(),
                },
            },
        }),
        ..Default::default()
    }
}

/// First `max` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
