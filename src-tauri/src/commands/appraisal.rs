use crate::appraisal::{appraisal_prompt, extract_certificate, new_certificate_id, Extraction};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::llm::{gemini, Content, InlineData, Part};
use tauri::State;

/// One-shot appraisal of uploaded photographs plus the owner's notes.
#[tauri::command]
pub async fn appraise_artifact(
    config: State<'_, AppConfig>,
    images: Vec<String>,
    notes: Option<String>,
) -> Result<Extraction, AppError> {
    if images.is_empty() {
        return Err(AppError::InvalidInput(
            "Please upload at least one photograph of the item first.".into(),
        ));
    }
    let gemini_config = config.gemini()?;

    let mut parts = images
        .iter()
        .map(|source| InlineData::from_source(source).map(Part::inline))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
        parts.push(Part::text(notes));
    }
    parts.push(Part::text(appraisal_prompt(&new_certificate_id())));

    log::info!("Appraising {} image(s) with {}", images.len(), config.appraisal_model);
    let raw = gemini::generate(&gemini_config, &config.appraisal_model, &[Content::user(parts)])
        .await
        .inspect_err(|e| log::error!("Appraisal request failed: {}", e))?;

    Ok(extract_certificate(&raw))
}
