//! Catalog use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into catalog level APIs.
//! - Keep outer adapters (CLI, HTTP) decoupled from storage details.

pub mod catalog_service;
pub mod error;
