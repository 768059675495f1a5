//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the authentication core:
//! - Logging and tracing infrastructure
//! - Provider configuration
//! - Session event bus
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that `core-auth` and
//! `token-gateway` depend on. It establishes the logging conventions,
//! configuration loading and event broadcasting used throughout the workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
