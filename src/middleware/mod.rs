//! HTTP middleware.
//!
//! Outermost first: request id, trace, CORS, general rate limit, security
//! logging, body limit. Activity logging wraps the `/api` tree and the
//! stricter rate-limit tiers wrap individual route groups.

pub mod activity_log;
pub mod auth;
pub mod client;
pub mod rate_limit;
pub mod security;
