//! Routing-registry whois lens
//!
//! Queries Team Cymru's IP-to-ASN whois service in verbose mode and parses its
//! pipe-delimited answer:
//!
//! ```text
//! AS      | IP               | BGP Prefix          | CC | Registry | Allocated  | AS Name
//! 15169   | 8.8.8.8          | 8.8.8.0/24          | US | arin     | 2023-12-28 | GOOGLE, US
//! ```
//!
//! The first line is a header; the second line carries the data.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default whois server for IP-to-ASN queries
pub const CYMRU_WHOIS_HOST: &str = "whois.cymru.com";

/// Default whois port
pub const WHOIS_PORT: u16 = 43;

/// Default timeout for a whois exchange
pub const DEFAULT_WHOIS_TIMEOUT: Duration = Duration::from_secs(15);

// =============================================================================
// Errors
// =============================================================================

/// Failure to obtain an answer from the whois service
#[derive(Debug, thiserror::Error)]
pub enum WhoisError {
    /// No complete answer within the configured timeout
    #[error("whois query timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or I/O failure
    #[error("whois query failed: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with bytes that are not text
    #[error("whois response is not valid UTF-8")]
    Decode,
}

impl WhoisError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WhoisError::Timeout(_))
    }
}

/// The whois answer could not be used
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WhoisDataError {
    #[error("response has no data line")]
    NoDataLine,

    #[error("data line has {0} fields, expected at least 7")]
    TooFewFields(usize),

    #[error("AS number is missing or NA")]
    MissingAsn,

    #[error("BGP prefix is empty")]
    MissingPrefix,

    #[error("BGP prefix '{0}' is not a valid CIDR block")]
    InvalidPrefix(String),

    #[error("AS name is empty")]
    MissingAsName,
}

// =============================================================================
// Record
// =============================================================================

/// Parsed data line of a verbose whois answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoisRecord {
    pub asn: String,
    pub ip: String,
    pub prefix: IpNet,
    pub country: String,
    pub registry: String,
    pub allocated: String,
    pub as_name: String,
}

impl WhoisRecord {
    /// Parse and validate a full whois response
    pub fn parse(response: &str) -> Result<Self, WhoisDataError> {
        let data_line = response.lines().nth(1).ok_or(WhoisDataError::NoDataLine)?;

        let fields: Vec<&str> = data_line.split('|').map(str::trim).collect();
        if fields.len() < 7 {
            return Err(WhoisDataError::TooFewFields(fields.len()));
        }

        let asn = fields[0];
        if asn.is_empty() || asn == "NA" {
            return Err(WhoisDataError::MissingAsn);
        }
        let prefix = fields[2];
        if prefix.is_empty() {
            return Err(WhoisDataError::MissingPrefix);
        }
        let as_name = fields[6];
        if as_name.is_empty() {
            return Err(WhoisDataError::MissingAsName);
        }
        let prefix = prefix
            .parse::<IpNet>()
            .map_err(|_| WhoisDataError::InvalidPrefix(prefix.to_string()))?;

        Ok(Self {
            asn: asn.to_string(),
            ip: fields[1].to_string(),
            prefix,
            country: fields[3].to_string(),
            registry: fields[4].to_string(),
            allocated: fields[5].to_string(),
            as_name: as_name.to_string(),
        })
    }

    /// Registry description, e.g. `GOOGLE, US (AS15169)`
    pub fn description(&self) -> String {
        format!("{} (AS{})", self.as_name, self.asn)
    }
}

// =============================================================================
// Client
// =============================================================================

/// Source of raw whois answers
pub trait WhoisClient: Send + Sync {
    /// Return the raw verbose answer for one address
    fn query(&self, ip: &str) -> Result<String, WhoisError>;
}

/// TCP client for Team Cymru's whois service
#[derive(Debug, Clone)]
pub struct CymruWhois {
    host: String,
    port: u16,
    timeout: Duration,
}

impl CymruWhois {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    fn map_io(&self, e: std::io::Error) -> WhoisError {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                WhoisError::Timeout(self.timeout)
            }
            _ => WhoisError::Io(e),
        }
    }
}

impl Default for CymruWhois {
    fn default() -> Self {
        Self::new(CYMRU_WHOIS_HOST, WHOIS_PORT, DEFAULT_WHOIS_TIMEOUT)
    }
}

impl WhoisClient for CymruWhois {
    fn query(&self, ip: &str) -> Result<String, WhoisError> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| self.map_io(e))?;

        let mut last_err = None;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let mut stream = match (stream, last_err) {
            (Some(s), _) => s,
            (None, Some(e)) => return Err(self.map_io(e)),
            (None, None) => {
                return Err(WhoisError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address found for {}", self.host),
                )))
            }
        };

        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| self.map_io(e))?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| self.map_io(e))?;

        stream
            .write_all(format!(" -v {}\r\n", ip).as_bytes())
            .map_err(|e| self.map_io(e))?;

        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .map_err(|e| self.map_io(e))?;

        String::from_utf8(buf).map_err(|_| WhoisError::Decode)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    const GOOGLE: &str = "AS      | IP               | BGP Prefix          | CC | Registry | Allocated  | AS Name\n15169   | 8.8.8.8 | 8.8.8.0/24 | US | arin | 2023-12-28 | GOOGLE, US\n";

    #[test]
    fn test_parse_verbose_answer() {
        let record = WhoisRecord::parse(GOOGLE).unwrap();
        assert_eq!(record.asn, "15169");
        assert_eq!(record.ip, "8.8.8.8");
        assert_eq!(record.prefix.to_string(), "8.8.8.0/24");
        assert_eq!(record.country, "US");
        assert_eq!(record.registry, "arin");
        assert_eq!(record.allocated, "2023-12-28");
        assert_eq!(record.as_name, "GOOGLE, US");
        assert_eq!(record.description(), "GOOGLE, US (AS15169)");
    }

    #[test]
    fn test_parse_rejects_header_only() {
        let header = "AS | IP | BGP Prefix | CC | Registry | Allocated | AS Name\n";
        assert_eq!(WhoisRecord::parse(header), Err(WhoisDataError::NoDataLine));
        assert_eq!(WhoisRecord::parse(""), Err(WhoisDataError::NoDataLine));
    }

    #[test]
    fn test_parse_rejects_unrouted() {
        let unrouted = "AS | IP | BGP Prefix | CC | Registry | Allocated | AS Name\nNA | 10.1.1.1 | NA | | other | | NA\n";
        assert_eq!(WhoisRecord::parse(unrouted), Err(WhoisDataError::MissingAsn));

        let empty_asn = "header\n | 1.2.3.4 | 1.2.3.0/24 | US | arin | | NAME\n";
        assert_eq!(WhoisRecord::parse(empty_asn), Err(WhoisDataError::MissingAsn));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let short = "header\n15169 | 8.8.8.8 | 8.8.8.0/24\n";
        assert_eq!(WhoisRecord::parse(short), Err(WhoisDataError::TooFewFields(3)));

        let no_prefix = "header\n15169 | 8.8.8.8 |  | US | arin | 2023-12-28 | GOOGLE\n";
        assert_eq!(WhoisRecord::parse(no_prefix), Err(WhoisDataError::MissingPrefix));

        let no_name = "header\n15169 | 8.8.8.8 | 8.8.8.0/24 | US | arin | 2023-12-28 | \n";
        assert_eq!(WhoisRecord::parse(no_name), Err(WhoisDataError::MissingAsName));

        let bad_prefix = "header\n15169 | 8.8.8.8 | 8.8.8.0/33 | US | arin | 2023-12-28 | GOOGLE\n";
        assert_eq!(
            WhoisRecord::parse(bad_prefix),
            Err(WhoisDataError::InvalidPrefix("8.8.8.0/33".to_string()))
        );
    }

    #[test]
    fn test_query_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut line = [0u8; 64];
            let n = conn.read(&mut line).unwrap();
            let received = String::from_utf8_lossy(&line[..n]).to_string();
            conn.write_all(GOOGLE.as_bytes()).unwrap();
            received
        });

        let client = CymruWhois::new("127.0.0.1", port, Duration::from_secs(5));
        let answer = client.query("8.8.8.8").unwrap();
        assert_eq!(answer, GOOGLE);
        assert_eq!(server.join().unwrap(), " -v 8.8.8.8\r\n");
    }

    #[test]
    fn test_query_times_out() {
        // accept the connection but never answer
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(800));
            drop(conn);
        });

        let client = CymruWhois::new("127.0.0.1", port, Duration::from_millis(200));
        let err = client.query("8.8.8.8").unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {err}");
        server.join().unwrap();
    }

    #[test]
    fn test_query_connection_refused() {
        // bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = CymruWhois::new("127.0.0.1", port, Duration::from_secs(1));
        let err = client.query("8.8.8.8").unwrap_err();
        assert!(matches!(err, WhoisError::Io(_)));
    }
}
