//! Webhook request authorization.
//!
//! Two independent checks, each disable-able via configuration:
//!
//! 1. The source address must fall within the platform's published IPv4
//!    ranges (`149.154.160.0/20` and `91.108.4.0/22`).
//! 2. The token embedded in the last path segment of the request URL must
//!    equal the bot's secret token.
//!
//! A request failing either enabled check is rejected before it reaches
//! decoding or dispatch.

use std::net::{IpAddr, Ipv4Addr};

use tracing::debug;

use crate::error::AuthError;

/// An IPv4 CIDR range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Range {
    base: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Range {
    /// Creates a range from a base address and prefix length.
    ///
    /// # Panics
    ///
    /// If `prefix_len` exceeds 32.
    pub const fn new(base: Ipv4Addr, prefix_len: u8) -> Self {
        assert!(prefix_len <= 32, "IPv4 prefix length must be at most 32");
        Self { base, prefix_len }
    }

    /// Whether `addr` falls inside this range.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix_len))
        };
        u32::from_be_bytes(addr.octets()) & mask == u32::from_be_bytes(self.base.octets()) & mask
    }
}

/// The IPv4 ranges the platform publishes for webhook delivery.
pub const PLATFORM_RANGES: [Ipv4Range; 2] = [
    Ipv4Range::new(Ipv4Addr::new(149, 154, 160, 0), 20),
    Ipv4Range::new(Ipv4Addr::new(91, 108, 4, 0), 22),
];

/// Configuration-driven webhook authorization.
#[derive(Debug, Clone)]
pub struct WebhookAuth {
    secret_token: Option<String>,
    check_source_ip: bool,
    ranges: Vec<Ipv4Range>,
}

impl Default for WebhookAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookAuth {
    /// Creates an authorizer with both checks disabled.
    pub fn new() -> Self {
        Self {
            secret_token: None,
            check_source_ip: false,
            ranges: PLATFORM_RANGES.to_vec(),
        }
    }

    /// Enables the path-token check against `token`.
    pub fn with_secret_token(mut self, token: impl Into<String>) -> Self {
        self.secret_token = Some(token.into());
        self
    }

    /// Enables or disables the source-address check.
    pub fn check_source_ip(mut self, enabled: bool) -> Self {
        self.check_source_ip = enabled;
        self
    }

    /// Replaces the allowed source ranges. Mostly useful in tests.
    pub fn with_ranges(mut self, ranges: Vec<Ipv4Range>) -> Self {
        self.ranges = ranges;
        self
    }

    /// Runs every enabled check against one inbound request.
    ///
    /// # Errors
    ///
    /// The first failing check's [`AuthError`]; the request must then be
    /// answered with an access-denied response and never dispatched.
    pub fn authorize(&self, remote: Option<IpAddr>, path_token: &str) -> Result<(), AuthError> {
        if self.check_source_ip {
            let v4 = match remote {
                None => return Err(AuthError::MissingSource),
                Some(IpAddr::V4(v4)) => v4,
                Some(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                    Some(v4) => v4,
                    None => return Err(AuthError::ForbiddenSource(IpAddr::V6(v6))),
                },
            };
            if !self.ranges.iter().any(|range| range.contains(v4)) {
                debug!(source = %v4, "webhook source outside allowed ranges");
                return Err(AuthError::ForbiddenSource(IpAddr::V4(v4)));
            }
        }

        if let Some(secret) = &self.secret_token {
            if secret != path_token {
                debug!("webhook path token mismatch");
                return Err(AuthError::TokenMismatch);
            }
        }

        Ok(())
    }
}
