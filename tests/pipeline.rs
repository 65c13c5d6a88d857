//! End-to-end lookup and fallback resolution over the JSON stores

use asnmap::lens::registry::{RegistryClient, RegistryError, RegistryResponse, SyncRequest};
use asnmap::lens::whois::WhoisError;
use asnmap::{
    convert_to_cidr, FallbackResolver, JsonMissingStore, JsonProcessedLedger, LookupError,
    LookupLens, MissingAddressStore, ProcessedLedger, ProcessedStatus, RangeTable, SyncDispatcher,
    WhoisClient,
};
use std::fs;
use std::sync::{Arc, Mutex};

const RANGE_CSV: &str = "\
start_ip,end_ip,asn,as_name,as_domain
8.8.8.0,8.8.8.255,15169,GOOGLE,google.com
10.0.0.1,10.0.0.3,64500,EXAMPLE,example.net
not-an-ip,10.0.0.9,1,BROKEN,broken.example
2001:db8::,2001:db8::ffff,64501,V6NET,v6.example
";

const GOOGLE_WHOIS: &str = "AS      | IP               | BGP Prefix          | CC | Registry | Allocated  | AS Name\n15169   | 8.8.8.8 | 8.8.8.0/24 | US | arin | 2023-12-28 | GOOGLE, US\n";

#[derive(Default)]
struct RecordingRegistry {
    requests: Mutex<Vec<SyncRequest>>,
}

impl RegistryClient for RecordingRegistry {
    fn create_prefix(&self, request: &SyncRequest) -> Result<RegistryResponse, RegistryError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(RegistryResponse::Created)
    }
}

impl RecordingRegistry {
    fn sent(&self) -> Vec<(String, String)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.prefix.clone(), r.description.clone()))
            .collect()
    }
}

/// Answers every query with the Google record
struct StaticWhois;

impl WhoisClient for StaticWhois {
    fn query(&self, ip: &str) -> Result<String, WhoisError> {
        if ip == "203.0.113.7" {
            Ok(GOOGLE_WHOIS.to_string())
        } else {
            Err(WhoisError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )))
        }
    }
}

struct Pipeline {
    _dir: tempfile::TempDir,
    missing_path: std::path::PathBuf,
    missing: Arc<JsonMissingStore>,
    ledger: Arc<JsonProcessedLedger>,
    registry: Arc<RecordingRegistry>,
    lens: LookupLens,
}

fn pipeline() -> Pipeline {
    let dir = tempfile::tempdir().unwrap();
    let missing_path = dir.path().join("missing_ips.json");
    let missing = Arc::new(JsonMissingStore::new(&missing_path).unwrap());
    let ledger = Arc::new(JsonProcessedLedger::new(dir.path().join("processed_ips.json")).unwrap());
    let registry = Arc::new(RecordingRegistry::default());
    let table = RangeTable::from_csv_reader(RANGE_CSV.as_bytes()).unwrap();
    let lens = LookupLens::new(
        Arc::new(table),
        missing.clone(),
        Arc::new(SyncDispatcher::new(registry.clone()).with_dedup()),
    );
    Pipeline {
        _dir: dir,
        missing_path,
        missing,
        ledger,
        registry,
        lens,
    }
}

#[test]
fn malformed_rows_are_skipped_at_load() {
    let p = pipeline();
    assert_eq!(p.lens.table().len(), 3);
    assert_eq!(p.lens.table().load_stats().skipped, 1);
}

#[test]
fn lookup_match_syncs_prefix() {
    let p = pipeline();
    let result = p.lens.lookup(Some("8.8.8.8")).unwrap();

    assert_eq!(result.asn, "15169");
    assert_eq!(
        serde_json::to_value(&result.prefixes).unwrap(),
        serde_json::json!(["8.8.8.0/24"])
    );
    assert_eq!(
        p.registry.sent(),
        vec![(
            "8.8.8.0/24".to_string(),
            "GOOGLE (15169), google.com".to_string()
        )]
    );

    // same prefix is not created twice by one process
    p.lens.lookup(Some("8.8.8.9")).unwrap();
    assert_eq!(p.registry.sent().len(), 1);
}

#[test]
fn lookup_unaligned_and_ipv6_ranges() {
    let p = pipeline();
    let result = p.lens.resolve(Some("10.0.0.2")).unwrap();
    let prefixes: Vec<String> = result.prefixes.iter().map(|n| n.to_string()).collect();
    assert_eq!(prefixes, convert_to_cidr("10.0.0.1", "10.0.0.3").unwrap());
    assert_eq!(prefixes, vec!["10.0.0.1/32", "10.0.0.2/31"]);

    let result = p.lens.resolve(Some("2001:db8::42")).unwrap();
    let prefixes: Vec<String> = result.prefixes.iter().map(|n| n.to_string()).collect();
    assert_eq!(prefixes, vec!["2001:db8::/112"]);
}

#[test]
fn invalid_address_is_rejected_without_side_effects() {
    let p = pipeline();
    let err = p.lens.lookup(Some("not-an-ip")).unwrap_err();
    assert!(matches!(err, LookupError::InvalidAddress));
    assert_eq!(err.status_code(), 400);
    assert!(!p.missing_path.exists());
}

#[test]
fn miss_is_cached_then_resolved_through_whois() {
    let p = pipeline();

    let err = p.lens.lookup(Some("203.0.113.7")).unwrap_err();
    assert!(matches!(err, LookupError::NotFoundInTable));
    let on_disk: Vec<String> =
        serde_json::from_str(&fs::read_to_string(&p.missing_path).unwrap()).unwrap();
    assert_eq!(on_disk, vec!["203.0.113.7"]);

    p.lens.lookup(Some("198.51.100.1")).unwrap_err();
    assert!(matches!(
        p.lens.lookup(Some("203.0.113.7")),
        Err(LookupError::AlreadyKnownMissing)
    ));

    let resolver = FallbackResolver::new(
        p.missing.clone(),
        p.ledger.clone(),
        Arc::new(StaticWhois),
        Arc::new(SyncDispatcher::new(p.registry.clone())),
    );
    let summary = resolver.run().unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.success, 1);
    assert_eq!(summary.whois_error, 1);

    assert_eq!(
        p.registry.sent(),
        vec![(
            "8.8.8.0/24".to_string(),
            "GOOGLE, US (AS15169)".to_string()
        )]
    );
    assert_eq!(
        p.ledger.get("203.0.113.7").unwrap(),
        Some(ProcessedStatus::Success)
    );
    assert_eq!(
        p.ledger.get("198.51.100.1").unwrap(),
        Some(ProcessedStatus::WhoisError { timed_out: false })
    );

    // the missing store is never shrunk by the resolver
    assert_eq!(p.missing.entries().unwrap().len(), 2);

    // nothing is retried on the next run
    let summary = resolver.run().unwrap();
    assert_eq!(summary.skipped, 2);
    assert_eq!(p.registry.sent().len(), 1);
}
