//! Ratekeeper - HTTP middleware toolkit
//!
//! This crate sits underneath an application's route handlers. It provides a
//! typed error-to-status dispatch convention for handlers, an ordered
//! middleware chain composed once per route, and a per-client token-bucket
//! rate limiter whose idle entries are evicted by a background sweeper.

pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod ratelimit;
pub mod server;
