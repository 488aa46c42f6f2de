//! Client identity resolution from request metadata.

use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// Default trusted single-value header.
pub const DEFAULT_REAL_IP_HEADER: &str = "x-real-ip";
/// Default trusted comma-separated forwarding header.
pub const DEFAULT_FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Errors that can occur while resolving a client identity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("no valid client IP address found")]
    NotFound,
    #[error("invalid header name: {0}")]
    InvalidHeaderName(String),
}

/// Resolves the client IP address a request should be attributed to.
///
/// Resolution order:
/// 1. the trusted single-value header, if it holds a valid address
/// 2. the first valid address in the trusted forwarding header
/// 3. the peer address of the connection
///
/// Header names are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    real_ip_header: HeaderName,
    forwarded_for_header: HeaderName,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self {
            real_ip_header: HeaderName::from_static(DEFAULT_REAL_IP_HEADER),
            forwarded_for_header: HeaderName::from_static(DEFAULT_FORWARDED_FOR_HEADER),
        }
    }
}

impl IdentityResolver {
    /// Create a resolver trusting the given header names.
    pub fn new(real_ip_header: &str, forwarded_for_header: &str) -> Result<Self, IdentityError> {
        Ok(Self {
            real_ip_header: parse_header_name(real_ip_header)?,
            forwarded_for_header: parse_header_name(forwarded_for_header)?,
        })
    }

    /// Resolve the client address for `request`.
    pub fn resolve<B>(&self, request: &Request<B>) -> Result<IpAddr, IdentityError> {
        let headers = request.headers();

        let real_ip = headers
            .get(&self.real_ip_header)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_ip);
        if let Some(ip) = real_ip {
            return Ok(ip);
        }

        let forwarded = headers
            .get_all(&self.forwarded_for_header)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .find_map(parse_ip);
        if let Some(ip) = forwarded {
            return Ok(ip);
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or(IdentityError::NotFound)
    }

    /// Resolve the client identity string for `request`.
    pub fn identity<B>(&self, request: &Request<B>) -> Result<String, IdentityError> {
        self.resolve(request).map(|ip| ip.to_string())
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName, IdentityError> {
    HeaderName::try_from(name).map_err(|_| IdentityError::InvalidHeaderName(name.to_string()))
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    value.trim().parse().ok()
}
