//! CIDR summarization lens
//!
//! Converts an inclusive address range into the minimal ordered list of CIDR
//! blocks that covers it exactly. Both IPv4 and IPv6 are supported; the two
//! bounds must share a version.
//!
//! # Example
//!
//! ```rust
//! use asnmap::lens::cidr::convert_to_cidr;
//!
//! let prefixes = convert_to_cidr("10.0.0.1", "10.0.0.3").unwrap();
//! assert_eq!(prefixes, vec!["10.0.0.1/32", "10.0.0.2/31"]);
//! ```

use ipnet::{IpNet, Ipv4Net, Ipv6Net, PrefixLenError};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

// =============================================================================
// Errors
// =============================================================================

/// Errors returned by the summarizer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    /// Start address is greater than the end address
    #[error("Start IP must be less than or equal to End IP ({start} > {end})")]
    RangeOrderViolation { start: IpAddr, end: IpAddr },

    /// Bounds belong to different IP versions
    #[error("Start IP and End IP must be the same IP version ({start}, {end})")]
    VersionMismatch { start: IpAddr, end: IpAddr },

    /// A bound could not be parsed as an IP address
    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    PrefixLen(#[from] PrefixLenError),
}

// =============================================================================
// Summarizer
// =============================================================================

/// Summarize the inclusive range `[start, end]` into CIDR blocks.
///
/// Blocks are returned in increasing address order, never overlap, and their
/// union is exactly the input range. A single address yields one host block.
pub fn summarize(start: IpAddr, end: IpAddr) -> Result<Vec<IpNet>, CidrError> {
    match (start, end) {
        (IpAddr::V4(s), IpAddr::V4(e)) => {
            if s > e {
                return Err(CidrError::RangeOrderViolation { start, end });
            }
            aligned_blocks(u32::from(s) as u128, u32::from(e) as u128, 32)
                .into_iter()
                .map(|(base, len)| {
                    Ok(IpNet::V4(Ipv4Net::new(Ipv4Addr::from(base as u32), len)?))
                })
                .collect()
        }
        (IpAddr::V6(s), IpAddr::V6(e)) => {
            if s > e {
                return Err(CidrError::RangeOrderViolation { start, end });
            }
            aligned_blocks(u128::from(s), u128::from(e), 128)
                .into_iter()
                .map(|(base, len)| Ok(IpNet::V6(Ipv6Net::new(Ipv6Addr::from(base), len)?)))
                .collect()
        }
        _ => Err(CidrError::VersionMismatch { start, end }),
    }
}

/// Summarize a range given as address literals, returning prefix strings.
pub fn convert_to_cidr(start: &str, end: &str) -> Result<Vec<String>, CidrError> {
    let start_ip: IpAddr = start
        .trim()
        .parse()
        .map_err(|_| CidrError::InvalidAddress(start.to_string()))?;
    let end_ip: IpAddr = end
        .trim()
        .parse()
        .map_err(|_| CidrError::InvalidAddress(end.to_string()))?;

    Ok(summarize(start_ip, end_ip)?
        .iter()
        .map(|p| p.to_string())
        .collect())
}

/// Walk from `start` to `end` emitting `(base, prefix_len)` pairs.
///
/// `width` is the address width in bits (32 or 128). Callers guarantee
/// `start <= end` and that both values fit in `width` bits.
fn aligned_blocks(start: u128, end: u128, width: u32) -> Vec<(u128, u8)> {
    let mut blocks = Vec::new();
    let mut cursor = start;

    loop {
        // largest block the cursor is aligned to
        let align_bits = cursor.trailing_zeros().min(width);

        // largest block that still fits in the remaining span
        let span_minus_one = end - cursor;
        let fit_bits = match span_minus_one.checked_add(1) {
            Some(span) => 127 - span.leading_zeros(),
            None => 128,
        };

        let host_bits = align_bits.min(fit_bits);
        blocks.push((cursor, (width - host_bits) as u8));

        let block_last = match host_bits {
            128 => u128::MAX,
            bits => cursor + ((1u128 << bits) - 1),
        };
        if block_last >= end {
            break;
        }
        cursor = block_last + 1;
    }

    blocks
}

// =============================================================================
// Tests
// =============================================================================
