use crate::appraisal::{appraisal_prompt, new_certificate_id};
use crate::chat::{self, ChatMessage, ChatSession, UsageStatus};
use crate::config::AppConfig;
use crate::db::Database;
use crate::error::AppError;
use crate::llm::{gemini, StreamChunk};
use serde::Serialize;
use tauri::{Emitter, State};

#[derive(Clone, Serialize)]
struct ChatStreamEvent {
    delta: String,
    done: bool,
}

/// Sends one chat message to the curator, streaming the reply as
/// `appraisal-stream` events. Counts against the daily allowance.
#[tauri::command]
pub async fn send_chat_message(
    app: tauri::AppHandle,
    db: State<'_, Database>,
    session: State<'_, ChatSession>,
    config: State<'_, AppConfig>,
    text: String,
) -> Result<ChatMessage, AppError> {
    let gemini_config = config.gemini()?;
    let model = config.appraisal_model.clone();
    let today = chat::local_today();

    chat::run_turn(&db, &session, &today, &text, move |history| async move {
        let instructions = appraisal_prompt(&new_certificate_id());
        let contents = chat::history_contents(&history, &instructions);
        gemini::generate_stream(&gemini_config, &model, &contents, |chunk: StreamChunk| {
            let _ = app.emit(
                "appraisal-stream",
                ChatStreamEvent {
                    delta: chunk.delta,
                    done: chunk.done,
                },
            );
        })
        .await
    })
    .await
    .inspect_err(|e| log::warn!("Chat turn failed: {}", e))
}

#[tauri::command]
pub fn get_chat_history(session: State<'_, ChatSession>) -> Vec<ChatMessage> {
    session.messages()
}

#[tauri::command]
pub fn clear_chat_history(session: State<'_, ChatSession>) {
    session.clear();
}

#[tauri::command]
pub fn get_daily_usage(db: State<'_, Database>) -> Result<UsageStatus, AppError> {
    chat::usage_status(&db, &chat::local_today())
}
