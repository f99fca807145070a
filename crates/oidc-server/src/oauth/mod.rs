//! OAuth 2.0 endpoints
//!
//! Implements:
//! - Token endpoint (RFC 6749 Section 3.2) for the client credentials and
//!   resource owner password grants
//! - Client authentication via form parameters or HTTP Basic

pub mod client_auth;
pub mod token;
