use crate::error::AppError;
use crate::llm::InlineData;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::path::Path;

impl InlineData {
    /// Builds inline data from either a `data:<mime>;base64,<payload>` URL (what
    /// the webview's file reader produces) or a path on disk.
    pub fn from_source(source: &str) -> Result<Self, AppError> {
        let source = source.trim();
        if source.starts_with("data:") {
            return parse_data_url(source);
        }
        Self::from_path(Path::new(source))
    }

    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let bytes = std::fs::read(path).map_err(|source| AppError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(InlineData {
            mime_type,
            data: BASE64.encode(bytes),
        })
    }
}

fn parse_data_url(url: &str) -> Result<InlineData, AppError> {
    let invalid = || AppError::InvalidInput("Unreadable image data; please choose the file again.".into());

    let rest = url.strip_prefix("data:").ok_or_else(invalid)?;
    let (meta, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime_type = meta.strip_suffix(";base64").ok_or_else(invalid)?;
    let mime_type = mime_type.split(';').next().unwrap_or_default().trim();
    if mime_type.is_empty() || payload.is_empty() {
        return Err(invalid());
    }
    if BASE64.decode(payload).is_err() {
        return Err(invalid());
    }

    Ok(InlineData {
        mime_type: mime_type.to_string(),
        data: payload.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base64_data_url() {
        let data = InlineData::from_source("data:image/jpeg;base64,/9j/4AAQ").unwrap();
        assert_eq!(data.mime_type, "image/jpeg");
        assert_eq!(data.data, "/9j/4AAQ");
    }

    #[test]
    fn rejects_non_base64_data_url() {
        assert!(matches!(
            InlineData::from_source("data:text/plain,hello"),
            Err(AppError::InvalidInput(_))
        ));
        assert!(InlineData::from_source("data:;base64,AAAA").is_err());
        assert!(InlineData::from_source("data:image/png;base64,***").is_err());
    }

    #[test]
    fn reads_file_with_guessed_type() {
        let path = std::env::temp_dir().join(format!("appraiser-{}.png", uuid::Uuid::new_v4()));
        std::fs::write(&path, [0x89u8, b'P', b'N', b'G']).unwrap();

        let data = InlineData::from_source(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(data.mime_type, "image/png");
        assert_eq!(data.data, BASE64.encode([0x89u8, b'P', b'N', b'G']));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            InlineData::from_source("/definitely/not/here.jpg"),
            Err(AppError::Io { .. })
        ));
    }
}
