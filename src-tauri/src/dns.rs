//! Custom-domain propagation checks against a public DNS-over-HTTPS resolver.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub const POLL_INTERVAL: Duration = Duration::from_secs(30);
const BUSY_RELEASE_DELAY: Duration = Duration::from_secs(1);

/// A-record value the hosting provider asks for.
const PROVIDER_A_RECORD: &str = "76.76.21.21";

const PROVIDER_PREFIXES: &[&str] = &["76.76.21.", "66.33."];
const PROVIDER_ADDRESSES: &[&str] = &[PROVIDER_A_RECORD, "216.198.79.1"];

const RECORD_TYPE_A: u16 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DohResponse {
    pub status: i32,
    #[serde(default)]
    pub answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
pub struct DohAnswer {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: u16,
    #[serde(rename = "TTL", default)]
    pub ttl: u32,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DnsStatus {
    pub domain: String,
    pub propagated: bool,
    pub addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: String,
}

impl DnsStatus {
    fn new(domain: &str, addresses: Vec<String>, error: Option<String>) -> Self {
        Self {
            domain: domain.to_string(),
            propagated: classify(addresses.as_slice()),
            addresses,
            error,
            checked_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub fn is_provider_address(ip: &str) -> bool {
    PROVIDER_ADDRESSES.contains(&ip) || PROVIDER_PREFIXES.iter().any(|p| ip.starts_with(p))
}

/// Propagated once any resolved address belongs to the hosting provider.
pub fn classify<S: AsRef<str>>(addresses: &[S]) -> bool {
    addresses.iter().any(|ip| is_provider_address(ip.as_ref()))
}

/// Bare host name from user input such as `https://Example.com/`.
pub fn normalize_domain(input: &str) -> Option<String> {
    let input = input.trim();
    let without_scheme = input
        .strip_prefix("https://")
        .or_else(|| input.strip_prefix("http://"))
        .unwrap_or(input);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('.')
        .to_lowercase();
    if host.is_empty() || host.contains(char::is_whitespace) {
        None
    } else {
        Some(host)
    }
}

pub fn parse_resolver_response(domain: &str, response: DohResponse) -> DnsStatus {
    if response.status != 0 {
        return DnsStatus::new(
            domain,
            Vec::new(),
            Some("The domain was not found or its records have not spread yet.".into()),
        );
    }

    let addresses = response
        .answer
        .into_iter()
        .filter(|a| a.record_type == RECORD_TYPE_A)
        .map(|a| a.data.replace('"', ""))
        .collect();
    DnsStatus::new(domain, addresses, None)
}

async fn query_resolver(resolver_url: &str, domain: &str) -> Result<DohResponse, reqwest::Error> {
    Client::new()
        .get(resolver_url)
        .query(&[("name", domain), ("type", "A")])
        .header("Accept", "application/dns-json")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}

/// Looks up A records for `domain`. Failures are logged and reported as
/// not-yet-propagated so the next poll can try again.
pub async fn check_domain(resolver_url: &str, domain: &str) -> DnsStatus {
    match query_resolver(resolver_url, domain).await {
        Ok(response) => parse_resolver_response(domain, response),
        Err(e) => {
            log::error!("DNS check for {} failed: {}", domain, e);
            DnsStatus::new(
                domain,
                Vec::new(),
                Some("The lookup failed; it will be retried shortly.".into()),
            )
        }
    }
}

/// Guards against overlapping checks. A trigger that arrives while a check is
/// outstanding, or within the release delay after it, is ignored.
pub struct DnsMonitor {
    checking: Arc<AtomicBool>,
    release_delay: Duration,
    last: Mutex<Option<DnsStatus>>,
}

impl Default for DnsMonitor {
    fn default() -> Self {
        Self::with_release_delay(BUSY_RELEASE_DELAY)
    }
}

impl DnsMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_release_delay(release_delay: Duration) -> Self {
        Self {
            checking: Arc::new(AtomicBool::new(false)),
            release_delay,
            last: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn is_checking(&self) -> bool {
        self.checking.load(Ordering::SeqCst)
    }

    pub fn last_status(&self) -> Option<DnsStatus> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs `check` unless one is already in flight. Must be called from
    /// within a tokio runtime.
    pub async fn trigger_with<Fut>(&self, check: Fut) -> Option<DnsStatus>
    where
        Fut: Future<Output = DnsStatus>,
    {
        if self.checking.swap(true, Ordering::SeqCst) {
            log::debug!("DNS check already running; ignoring trigger");
            return None;
        }
        let _release = BusyRelease {
            flag: self.checking.clone(),
            delay: self.release_delay,
        };

        let status = check.await;
        log::info!(
            "DNS status for {}: propagated={} addresses={:?}",
            status.domain,
            status.propagated,
            status.addresses
        );
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(status.clone());
        Some(status)
    }
}

/// Clears the busy flag `delay` after the check ends, including when the
/// check future is dropped before completing.
struct BusyRelease {
    flag: Arc<AtomicBool>,
    delay: Duration,
}

impl Drop for BusyRelease {
    fn drop(&mut self) {
        let flag = self.flag.clone();
        let delay = self.delay;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    flag.store(false, Ordering::SeqCst);
                });
            }
            Err(_) => flag.store(false, Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: serde_json::Value) -> DohResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn provider_address_is_propagated() {
        assert!(classify(&["76.76.21.21"]));
        assert!(classify(&["10.0.0.1", "66.33.60.129"]));
        assert!(classify(&["216.198.79.1"]));
    }

    #[test]
    fn foreign_address_is_not_propagated() {
        assert!(!classify(&["93.184.216.34"]));
        assert!(!classify::<&str>(&[]));
        assert!(!is_provider_address("216.198.79.10"));
    }

    #[test]
    fn keeps_only_a_records() {
        let status = parse_resolver_response(
            "antique-korea.com",
            response(json!({
                "Status": 0,
                "Answer": [
                    { "name": "antique-korea.com.", "type": 5, "TTL": 60, "data": "cname.vercel-dns.com." },
                    { "name": "antique-korea.com.", "type": 1, "TTL": 60, "data": "\"76.76.21.21\"" }
                ]
            })),
        );
        assert_eq!(status.addresses, vec!["76.76.21.21"]);
        assert!(status.propagated);
        assert_eq!(status.error, None);
    }

    #[test]
    fn nonzero_status_is_not_propagated() {
        let status = parse_resolver_response("nope.invalid", response(json!({ "Status": 3 })));
        assert!(!status.propagated);
        assert!(status.addresses.is_empty());
        assert!(status.error.is_some());
    }

    #[test]
    fn missing_answer_section_is_empty() {
        let status = parse_resolver_response("a.com", response(json!({ "Status": 0 })));
        assert!(status.addresses.is_empty());
        assert!(!status.propagated);
    }

    #[test]
    fn domains_are_normalized() {
        assert_eq!(
            normalize_domain(" https://Antique-Korea.com/about ").as_deref(),
            Some("antique-korea.com")
        );
        assert_eq!(normalize_domain("example.org.").as_deref(), Some("example.org"));
        assert_eq!(normalize_domain("   "), None);
        assert_eq!(normalize_domain("bad domain"), None);
    }

    #[tokio::test]
    async fn overlapping_triggers_are_ignored_until_released() {
        let monitor = DnsMonitor::with_release_delay(Duration::from_millis(50));
        let done = |ip: &str| {
            let status = DnsStatus::new("a.com", vec![ip.to_string()], None);
            async move { status }
        };

        let first = monitor.trigger_with(done("76.76.21.21")).await;
        assert!(first.is_some_and(|s| s.propagated));
        assert!(monitor.is_checking());

        assert_eq!(monitor.trigger_with(done("93.184.216.34")).await, None);
        assert!(monitor.last_status().is_some_and(|s| s.propagated));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!monitor.is_checking());

        let third = monitor.trigger_with(done("93.184.216.34")).await;
        assert!(third.is_some_and(|s| !s.propagated));
    }

    #[tokio::test]
    async fn abandoned_check_still_releases_the_flag() {
        let monitor = DnsMonitor::with_release_delay(Duration::from_millis(20));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            monitor.trigger_with(std::future::pending::<DnsStatus>()),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(monitor.is_checking());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!monitor.is_checking());

        let next = monitor
            .trigger_with(async { DnsStatus::new("a.com", vec!["66.33.1.1".into()], None) })
            .await;
        assert!(next.is_some_and(|s| s.propagated));
    }
}
