use crate::config::AppConfig;
use crate::db::Database;
use crate::dns::{self, normalize_domain, DnsMonitor, DnsStatus, POLL_INTERVAL};
use crate::error::AppError;
use tauri::{AppHandle, Emitter, Manager, State};

/// Checks whether `domain` (or the configured site domain) points at the
/// hosting provider. Returns `None` when a check is already in progress.
#[tauri::command]
pub async fn check_domain_status(
    app: AppHandle,
    db: State<'_, Database>,
    config: State<'_, AppConfig>,
    monitor: State<'_, DnsMonitor>,
    domain: Option<String>,
) -> Result<Option<DnsStatus>, AppError> {
    let domain = match domain {
        Some(domain) => domain,
        None => db.load_site_info()?.domain,
    };
    let domain = normalize_domain(&domain).ok_or_else(|| {
        AppError::InvalidInput("Enter a domain such as antique-korea.com.".into())
    })?;

    let status = monitor
        .trigger_with(dns::check_domain(&config.dns_resolver_url, &domain))
        .await;
    if let Some(status) = &status {
        let _ = app.emit("dns-status", status);
    }
    Ok(status)
}

#[tauri::command]
pub fn get_last_dns_status(monitor: State<'_, DnsMonitor>) -> Option<DnsStatus> {
    monitor.last_status()
}

/// Re-checks the configured domain immediately and then on every poll
/// interval, emitting `dns-status` for each completed check.
pub fn spawn_poller(app: AppHandle) {
    tauri::async_runtime::spawn(async move {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            ticker.tick().await;

            let domain = match app.state::<Database>().load_site_info() {
                Ok(info) => info.domain,
                Err(e) => {
                    log::error!("Could not load site domain for DNS poll: {}", e);
                    continue;
                }
            };
            let Some(domain) = normalize_domain(&domain) else {
                continue;
            };

            let resolver_url = app.state::<AppConfig>().dns_resolver_url.clone();
            let monitor = app.state::<DnsMonitor>();
            if let Some(status) = monitor
                .trigger_with(dns::check_domain(&resolver_url, &domain))
                .await
            {
                let _ = app.emit("dns-status", &status);
            }
        }
    });
}
