//! Registry sync lens
//!
//! Publishes discovered prefixes to a NetBox IPAM instance
//! (`POST /api/ipam/prefixes/`). Every prefix becomes one create request with
//! status `active`; only an HTTP `201 Created` answer counts as success.
//!
//! The plain dispatcher does no existence check, so publishing the same prefix
//! twice issues two create requests. [`SyncDispatcher::with_dedup`] adds an
//! in-process set of prefixes that were already created and skips them. Only a
//! `201 Created` answer enters that set.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

/// Status assigned to every prefix created by this crate
pub const PREFIX_STATUS_ACTIVE: &str = "active";

/// NetBox prefix endpoint, relative to the registry base URL
pub const NETBOX_PREFIXES_PATH: &str = "/api/ipam/prefixes/";

/// Default timeout for one registry request
pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Types
// =============================================================================

/// Body of a prefix create request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub prefix: String,
    pub description: String,
    pub status: String,
}

impl SyncRequest {
    pub fn new(prefix: &IpNet, description: impl Into<String>) -> Self {
        Self {
            prefix: prefix.to_string(),
            description: description.into(),
            status: PREFIX_STATUS_ACTIVE.to_string(),
        }
    }
}

/// Answer of the registry to a create request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryResponse {
    /// HTTP 201
    Created,
    /// Any other HTTP status, including "already exists" validation errors
    Rejected { status: u16, body: String },
}

/// The request never produced an HTTP answer
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry request timed out")]
    Timeout,

    #[error("registry request failed: {0}")]
    Transport(String),
}

/// Outcome of publishing one prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    /// Already created earlier by this process (dedup enabled)
    Skipped,
    Rejected { status: u16, body: String },
    Failed { timed_out: bool, reason: String },
}

impl SyncOutcome {
    /// Created now or earlier
    pub fn is_accepted(&self) -> bool {
        matches!(self, SyncOutcome::Created | SyncOutcome::Skipped)
    }
}

/// Per-prefix outcomes of one publish call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub outcomes: Vec<(IpNet, SyncOutcome)>,
}

impl SyncReport {
    /// True if every prefix was accepted (vacuously true when empty)
    pub fn all_accepted(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| o.is_accepted())
    }

    pub fn any_timed_out(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, o)| matches!(o, SyncOutcome::Failed { timed_out: true, .. }))
    }

    pub fn created_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == SyncOutcome::Created)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| !o.is_accepted()).count()
    }
}

// =============================================================================
// Client
// =============================================================================

/// Address-management registry that accepts prefix create requests
pub trait RegistryClient: Send + Sync {
    fn create_prefix(&self, request: &SyncRequest) -> Result<RegistryResponse, RegistryError>;
}

/// NetBox REST client
pub struct NetboxClient {
    agent: ureq::Agent,
    url: String,
    token: String,
}

impl NetboxClient {
    /// Create a client for the NetBox instance at `base_url`
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            url: format!("{}{}", base_url.trim_end_matches('/'), NETBOX_PREFIXES_PATH),
            token: token.into(),
        }
    }

    /// Full prefix endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.url
    }
}

impl RegistryClient for NetboxClient {
    fn create_prefix(&self, request: &SyncRequest) -> Result<RegistryResponse, RegistryError> {
        let result = self
            .agent
            .post(&self.url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send_json(request);

        let mut resp = match result {
            Ok(resp) => resp,
            Err(ureq::Error::Timeout(_)) => return Err(RegistryError::Timeout),
            Err(e) => return Err(RegistryError::Transport(e.to_string())),
        };

        let status = resp.status().as_u16();
        if status == 201 {
            return Ok(RegistryResponse::Created);
        }
        let body = resp.body_mut().read_to_string().unwrap_or_default();
        Ok(RegistryResponse::Rejected { status, body })
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

#[derive(Default)]
struct DedupState {
    created: HashSet<IpNet>,
    in_flight: HashSet<IpNet>,
}

/// Created and in-flight prefixes of one dispatcher
#[derive(Default)]
struct Dedup {
    state: Mutex<DedupState>,
    settled: Condvar,
}

impl Dedup {
    fn state(&self) -> MutexGuard<'_, DedupState> {
        // the sets stay consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `prefix` for sending, waiting while another caller is sending it
    ///
    /// Returns `None` once the prefix is known to be created.
    fn claim(&self, prefix: IpNet) -> Option<InFlight<'_>> {
        let mut state = self.state();
        loop {
            if state.created.contains(&prefix) {
                return None;
            }
            if state.in_flight.insert(prefix) {
                return Some(InFlight {
                    dedup: self,
                    prefix,
                    created: false,
                });
            }
            state = self
                .settled
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

/// A claimed prefix; dropping it releases the claim and wakes waiters
struct InFlight<'a> {
    dedup: &'a Dedup,
    prefix: IpNet,
    created: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.dedup.state();
        state.in_flight.remove(&self.prefix);
        if self.created {
            state.created.insert(self.prefix);
        }
        drop(state);
        self.dedup.settled.notify_all();
    }
}

/// Publishes `(prefix, description)` pairs to a registry
pub struct SyncDispatcher {
    client: Arc<dyn RegistryClient>,
    dedup: Option<Dedup>,
}

impl SyncDispatcher {
    /// Dispatcher without de-duplication: every call issues create requests
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self {
            client,
            dedup: None,
        }
    }

    /// Skip prefixes this dispatcher already created successfully
    ///
    /// A publisher that meets a prefix another caller is still sending waits
    /// for that request. It skips the prefix if the request created it and
    /// sends its own request otherwise.
    pub fn with_dedup(mut self) -> Self {
        self.dedup = Some(Dedup::default());
        self
    }

    /// Publish every prefix with the same description
    ///
    /// Failures are logged and reported; they never abort the remaining
    /// prefixes and are never returned as an error.
    pub fn publish(&self, prefixes: &[IpNet], description: &str) -> SyncReport {
        let mut report = SyncReport::default();

        for prefix in prefixes {
            let outcome = match &self.dedup {
                None => self.send(prefix, description),
                Some(dedup) => match dedup.claim(*prefix) {
                    None => SyncOutcome::Skipped,
                    Some(mut claim) => {
                        let outcome = self.send(prefix, description);
                        claim.created = outcome == SyncOutcome::Created;
                        outcome
                    }
                },
            };
            report.outcomes.push((*prefix, outcome));
        }

        report
    }

    fn send(&self, prefix: &IpNet, description: &str) -> SyncOutcome {
        let request = SyncRequest::new(prefix, description);
        match self.client.create_prefix(&request) {
            Ok(RegistryResponse::Created) => {
                info!("Prefix {} added to registry", prefix);
                SyncOutcome::Created
            }
            Ok(RegistryResponse::Rejected { status, body }) => {
                warn!("Failed to add prefix {}: HTTP {} {}", prefix, status, body);
                SyncOutcome::Rejected { status, body }
            }
            Err(e) => {
                warn!("Failed to add prefix {}: {}", prefix, e);
                SyncOutcome::Failed {
                    timed_out: matches!(e, RegistryError::Timeout),
                    reason: e.to_string(),
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Records requests and answers from a fixed script
    struct ScriptedRegistry {
        requests: Mutex<Vec<SyncRequest>>,
        answer: fn(&SyncRequest) -> Result<RegistryResponse, RegistryError>,
    }

    impl ScriptedRegistry {
        fn new(answer: fn(&SyncRequest) -> Result<RegistryResponse, RegistryError>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(vec![]),
                answer,
            })
        }

        fn sent(&self) -> Vec<SyncRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl RegistryClient for ScriptedRegistry {
        fn create_prefix(&self, request: &SyncRequest) -> Result<RegistryResponse, RegistryError> {
            self.requests.lock().unwrap().push(request.clone());
            (self.answer)(request)
        }
    }

    fn created(_: &SyncRequest) -> Result<RegistryResponse, RegistryError> {
        Ok(RegistryResponse::Created)
    }

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn test_publish_each_prefix_as_active() {
        let registry = ScriptedRegistry::new(created);
        let dispatcher = SyncDispatcher::new(registry.clone());

        let report = dispatcher.publish(&[net("10.0.0.1/32"), net("10.0.0.2/31")], "TEST (AS1)");
        assert!(report.all_accepted());
        assert_eq!(report.created_count(), 2);

        let sent = registry.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].prefix, "10.0.0.1/32");
        assert_eq!(sent[1].prefix, "10.0.0.2/31");
        assert!(sent.iter().all(|r| r.status == "active" && r.description == "TEST (AS1)"));
    }

    #[test]
    fn test_without_dedup_repeats_creates() {
        let registry = ScriptedRegistry::new(created);
        let dispatcher = SyncDispatcher::new(registry.clone());

        dispatcher.publish(&[net("8.8.8.0/24")], "GOOGLE");
        dispatcher.publish(&[net("8.8.8.0/24")], "GOOGLE");
        assert_eq!(registry.sent().len(), 2);
    }

    #[test]
    fn test_dedup_skips_created_prefixes() {
        let registry = ScriptedRegistry::new(created);
        let dispatcher = SyncDispatcher::new(registry.clone()).with_dedup();

        dispatcher.publish(&[net("8.8.8.0/24")], "GOOGLE");
        let report = dispatcher.publish(&[net("8.8.8.0/24")], "GOOGLE");

        assert_eq!(registry.sent().len(), 1);
        assert_eq!(report.outcomes, vec![(net("8.8.8.0/24"), SyncOutcome::Skipped)]);
        assert!(report.all_accepted());
    }

    #[test]
    fn test_dedup_retries_failed_prefixes() {
        fn exists(_: &SyncRequest) -> Result<RegistryResponse, RegistryError> {
            Ok(RegistryResponse::Rejected {
                status: 400,
                body: r#"{"prefix":["Duplicate prefix found"]}"#.to_string(),
            })
        }
        let registry = ScriptedRegistry::new(exists);
        let dispatcher = SyncDispatcher::new(registry.clone()).with_dedup();

        let report = dispatcher.publish(&[net("8.8.8.0/24")], "GOOGLE");
        assert!(!report.all_accepted());
        assert_eq!(report.failed_count(), 1);

        dispatcher.publish(&[net("8.8.8.0/24")], "GOOGLE");
        assert_eq!(registry.sent().len(), 2);
    }

    fn slow_failure(_: &SyncRequest) -> Result<RegistryResponse, RegistryError> {
        thread::sleep(Duration::from_millis(200));
        Err(RegistryError::Transport("connection reset".to_string()))
    }

    fn slow_created(_: &SyncRequest) -> Result<RegistryResponse, RegistryError> {
        thread::sleep(Duration::from_millis(200));
        Ok(RegistryResponse::Created)
    }

    /// Publish the same prefix from two threads, the second starting while the first is in flight
    fn publish_overlapping(dispatcher: SyncDispatcher) -> (SyncReport, SyncReport) {
        let dispatcher = Arc::new(dispatcher);
        let first = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || dispatcher.publish(&[net("8.8.8.0/24")], "GOOGLE"))
        };
        thread::sleep(Duration::from_millis(50));
        let second = dispatcher.publish(&[net("8.8.8.0/24")], "GOOGLE");
        (first.join().unwrap(), second)
    }

    #[test]
    fn test_dedup_in_flight_failure_is_not_accepted_by_waiter() {
        let registry = ScriptedRegistry::new(slow_failure);
        let (first, second) = publish_overlapping(SyncDispatcher::new(registry.clone()).with_dedup());

        assert!(!first.all_accepted());
        assert!(!second.all_accepted());
        assert!(matches!(second.outcomes[0].1, SyncOutcome::Failed { .. }));
        assert_eq!(registry.sent().len(), 2);
    }

    #[test]
    fn test_dedup_in_flight_success_is_skipped_by_waiter() {
        let registry = ScriptedRegistry::new(slow_created);
        let (first, second) = publish_overlapping(SyncDispatcher::new(registry.clone()).with_dedup());

        let mut outcomes = vec![first.outcomes[0].1.clone(), second.outcomes[0].1.clone()];
        outcomes.sort_by_key(|o| *o == SyncOutcome::Skipped);
        assert_eq!(outcomes, vec![SyncOutcome::Created, SyncOutcome::Skipped]);
        assert_eq!(registry.sent().len(), 1);
    }

    #[test]
    fn test_timeout_is_reported() {
        fn slow(_: &SyncRequest) -> Result<RegistryResponse, RegistryError> {
            Err(RegistryError::Timeout)
        }
        let dispatcher = SyncDispatcher::new(ScriptedRegistry::new(slow));
        let report = dispatcher.publish(&[net("8.8.8.0/24")], "GOOGLE");
        assert!(report.any_timed_out());
        assert!(!report.all_accepted());
    }

    /// Serve one HTTP request, answering with `status_line`, and return the raw request
    fn one_shot_http(status_line: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
                head.push_str(&line);
                if line == "\r\n" {
                    break;
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            let payload = r#"{"id":1}"#;
            let mut stream = stream;
            write!(
                stream,
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                payload.len(),
                payload
            )
            .unwrap();

            head + &String::from_utf8(body).unwrap()
        });

        (base, handle)
    }

    #[test]
    fn test_netbox_client_created() {
        let (base, server) = one_shot_http("HTTP/1.1 201 Created");
        let client = NetboxClient::new(&format!("{}/", base), "secret", Duration::from_secs(5));
        assert_eq!(client.endpoint(), format!("{}/api/ipam/prefixes/", base));

        let request = SyncRequest::new(&net("8.8.8.0/24"), "GOOGLE, US (AS15169)");
        assert_eq!(client.create_prefix(&request).unwrap(), RegistryResponse::Created);

        let raw = server.join().unwrap();
        assert!(raw.starts_with("POST /api/ipam/prefixes/ HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("authorization: token secret"));
        let body_start = raw.find("\r\n\r\n").unwrap() + 4;
        let body: SyncRequest = serde_json::from_str(&raw[body_start..]).unwrap();
        assert_eq!(body, request);
    }

    #[test]
    fn test_netbox_client_rejected() {
        let (base, server) = one_shot_http("HTTP/1.1 400 Bad Request");
        let client = NetboxClient::new(&base, "secret", Duration::from_secs(5));
        let request = SyncRequest::new(&net("8.8.8.0/24"), "GOOGLE");

        match client.create_prefix(&request).unwrap() {
            RegistryResponse::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, r#"{"id":1}"#);
            }
            other => panic!("unexpected response {:?}", other),
        }
        server.join().unwrap();
    }
}
