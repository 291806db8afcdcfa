use crate::audio::{decode_pcm16, AudioOutput};
use crate::book::BookInterpretation;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::llm::gemini::{self, truncate_chars, GeminiConfig};
use serde::Serialize;
use tauri::{AppHandle, Emitter, State};

/// Longest slice of an appraisal narrative that is read aloud.
pub const NARRATIVE_SPEECH_LIMIT: usize = 600;

#[derive(Clone, Serialize)]
struct SpeechStateEvent {
    speaking: bool,
}

fn emit_state(app: &AppHandle, speaking: bool) {
    let _ = app.emit("speech-state", SpeechStateEvent { speaking });
}

/// Reads an appraisal narrative aloud. Returns whether playback started;
/// playback failures are logged, not reported.
#[tauri::command]
pub async fn speak_narrative(
    app: AppHandle,
    config: State<'_, AppConfig>,
    audio: State<'_, AudioOutput>,
    text: String,
) -> Result<bool, AppError> {
    let gemini_config = config.gemini()?;
    let text = truncate_chars(text.trim(), NARRATIVE_SPEECH_LIMIT);
    Ok(speak(&app, &gemini_config, &config, &audio, &text).await)
}

/// Reads a document interpretation's translation and commentary aloud.
#[tauri::command]
pub async fn speak_interpretation(
    app: AppHandle,
    config: State<'_, AppConfig>,
    audio: State<'_, AudioOutput>,
    interpretation: BookInterpretation,
) -> Result<bool, AppError> {
    let gemini_config = config.gemini()?;
    let text = interpretation.speech_text();
    Ok(speak(&app, &gemini_config, &config, &audio, &text).await)
}

#[tauri::command]
pub fn stop_speech(app: AppHandle, audio: State<'_, AudioOutput>) {
    audio.stop();
    emit_state(&app, false);
}

#[tauri::command]
pub fn is_speaking(audio: State<'_, AudioOutput>) -> bool {
    audio.is_playing()
}

/// Stops whatever is playing, then synthesizes and plays `text`. A stop or a
/// newer request arriving during synthesis cancels this playback.
async fn speak(
    app: &AppHandle,
    gemini_config: &GeminiConfig,
    config: &AppConfig,
    audio: &AudioOutput,
    text: &str,
) -> bool {
    let request = audio.begin_request();
    if text.trim().is_empty() {
        emit_state(app, false);
        return false;
    }

    emit_state(app, true);
    match synthesize_and_play(app, gemini_config, config, audio, request, text).await {
        Ok(true) => true,
        Ok(false) => {
            log::info!("Speech request {} was cancelled before playback", request);
            false
        }
        Err(e) => {
            log::error!("Speech playback failed: {}", e);
            if audio.is_current(request) {
                emit_state(app, false);
            }
            false
        }
    }
}

async fn synthesize_and_play(
    app: &AppHandle,
    gemini_config: &GeminiConfig,
    config: &AppConfig,
    audio: &AudioOutput,
    request: u64,
    text: &str,
) -> Result<bool, String> {
    let payload = gemini::synthesize_speech(
        gemini_config,
        &config.speech_model,
        &config.speech_voice,
        text,
    )
    .await
    .map_err(|e| e.to_string())?
    .ok_or("speech model returned no audio")?;

    let buffer = decode_pcm16(&payload).map_err(|e| e.to_string())?;
    log::info!("Decoded {} speech frames", buffer.frames());

    let handle = app.clone();
    let played = audio
        .play_for(request, buffer, move || emit_state(&handle, false))
        .map_err(|e| e.to_string())?;
    if played {
        // the stopped source may have reported `false` while we were synthesizing
        emit_state(app, true);
    }
    Ok(played)
}
