//! Mailcast Common - Shared types and utilities
//!
//! This crate provides the recipient and endpoint types, configuration,
//! and the error type shared across all Mailcast components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{CampaignConfig, Config};
pub use error::{Error, Result};
pub use types::{
    Attachment, DispatchMode, EmailAddress, Recipient, RecipientField, TransportEndpoint,
    TransportSecurity,
};
