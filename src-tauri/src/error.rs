use crate::llm::LlmError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("API_KEY is not configured. Set the API_KEY environment variable and restart the app.")]
    MissingApiKey,
    #[error("The appraisal service did not respond properly. Please try again in a moment. ({0})")]
    Llm(#[from] LlmError),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Today's {limit} appraisals are used up. The instruments need a rest; please come back tomorrow.")]
    DailyLimitReached { limit: u32 },
    #[error("{0}")]
    InvalidInput(String),
    #[error("Could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not open {url}: {message}")]
    Open { url: String, message: String },
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
