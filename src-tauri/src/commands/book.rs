use crate::book::{
    interpretation_schema, parse_interpretation, BookInterpretation, INTERPRETATION_INSTRUCTION,
};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::llm::{gemini, Content, InlineData, Part};
use tauri::State;

/// Reads, translates and comments on a photographed old document.
#[tauri::command]
pub async fn interpret_document(
    config: State<'_, AppConfig>,
    image: String,
) -> Result<BookInterpretation, AppError> {
    let gemini_config = config.gemini()?;
    let inline = InlineData::from_source(&image)?;
    let contents = [Content::user(vec![
        Part::inline(inline),
        Part::text(INTERPRETATION_INSTRUCTION),
    ])];

    let raw = gemini::generate_json(
        &gemini_config,
        &config.interpretation_model,
        &contents,
        interpretation_schema(),
    )
    .await
    .inspect_err(|e| log::error!("Document interpretation failed: {}", e))?;

    Ok(parse_interpretation(&raw))
}
