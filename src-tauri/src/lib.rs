mod appraisal;
mod audio;
mod book;
mod chat;
mod commands;
mod config;
mod db;
mod dns;
mod error;
mod llm;
mod media;

use audio::AudioOutput;
use chat::ChatSession;
use config::AppConfig;
use db::Database;
use dns::DnsMonitor;
use tauri::{Manager, RunEvent};
use tauri_plugin_log::{Target, TargetKind};

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let config = AppConfig::from_env();

    tauri::Builder::default()
        .plugin(
            tauri_plugin_log::Builder::new()
                .targets([
                    Target::new(TargetKind::Stdout),
                    Target::new(TargetKind::LogDir {
                        file_name: Some("appraiser".into()),
                    }),
                ])
                .level(log::LevelFilter::Info)
                .build(),
        )
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(move |app| {
            let app_dir = app.path().app_data_dir()?;
            let database = Database::new(&app_dir)?;
            log::info!("Database ready in {}", app_dir.display());

            if !config.api_key_status().configured {
                log::warn!("API_KEY is not set; appraisal and speech are disabled");
            }

            app.manage(database);
            app.manage(config);
            app.manage(ChatSession::new());
            app.manage(AudioOutput::new());
            app.manage(DnsMonitor::new());

            commands::dns::spawn_poller(app.handle().clone());
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::appraisal::appraise_artifact,
            commands::chat::send_chat_message,
            commands::chat::get_chat_history,
            commands::chat::clear_chat_history,
            commands::chat::get_daily_usage,
            commands::book::interpret_document,
            commands::speech::speak_narrative,
            commands::speech::speak_interpretation,
            commands::speech::stop_speech,
            commands::speech::is_speaking,
            commands::settings::get_site_info,
            commands::settings::update_site_info,
            commands::settings::set_site_field,
            commands::settings::get_api_key_status,
            commands::settings::open_site,
            commands::dns::check_domain_status,
            commands::dns::get_last_dns_status,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            if let RunEvent::Exit = event {
                app.state::<AudioOutput>().shutdown();
            }
        });
}
