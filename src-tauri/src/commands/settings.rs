use crate::config::{ApiKeyStatus, AppConfig};
use crate::db::models::SiteInfo;
use crate::db::{Database, SITE_INFO_KEYS};
use crate::dns::normalize_domain;
use crate::error::AppError;
use tauri::State;
use tauri_plugin_opener::OpenerExt;

#[tauri::command]
pub fn get_site_info(db: State<'_, Database>) -> Result<SiteInfo, AppError> {
    Ok(db.load_site_info()?)
}

/// Persists every site field and returns what is now stored.
#[tauri::command]
pub fn update_site_info(db: State<'_, Database>, info: SiteInfo) -> Result<SiteInfo, AppError> {
    db.save_site_info(&info)?;
    log::info!("Site info updated (domain={})", info.domain);
    Ok(db.load_site_info()?)
}

#[tauri::command]
pub fn set_site_field(db: State<'_, Database>, key: String, value: String) -> Result<(), AppError> {
    if !SITE_INFO_KEYS.contains(&key.as_str()) {
        return Err(AppError::InvalidInput(format!("Unknown site setting: {}", key)));
    }
    db.set_setting(&key, &value)?;
    Ok(())
}

#[tauri::command]
pub fn get_api_key_status(config: State<'_, AppConfig>) -> ApiKeyStatus {
    config.api_key_status()
}

/// Opens the configured custom domain in the system browser.
#[tauri::command]
pub fn open_site(app: tauri::AppHandle, db: State<'_, Database>) -> Result<(), AppError> {
    let domain = db.load_site_info()?.domain;
    let domain = normalize_domain(&domain)
        .ok_or_else(|| AppError::InvalidInput("No domain is configured yet.".into()))?;
    let url = format!("https://{}", domain);
    app.opener()
        .open_url(url.as_str(), None::<&str>)
        .map_err(|e| AppError::Open {
            url,
            message: e.to_string(),
        })
}
