//! API module for shared identity functionality
//!
//! # Design Principle
//!
//! This module contains ONLY:
//! - Pure functions (no HTTP framework dependencies)
//! - Database operations (via sqlx)
//! - Shared types
//!
//! The server wraps these with framework-specific middleware (Axum).

pub mod auth;

pub use auth::{
    hash_password, initialize_shared_secret, issue_token, load_shared_secret, verify_password,
    verify_token, ApiAuthError, TokenClaims,
};
