//! # InfraFix Common Library
//!
//! Shared code for the InfraFix service and tooling:
//! - Database models and schema initialization
//! - Identity primitives (roles, bearer tokens, password hashing)
//! - Configuration loading
//! - Time helpers

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
