//! Mailcast Storage - Campaign resource loading
//!
//! Recipients, templates, endpoint pools, sender pools, policy keywords,
//! placeholders and attachments are read once per campaign through the
//! [`ResourceProvider`] trait.

pub mod file;
pub mod memory;
pub mod provider;

pub use file::FileResourceProvider;
pub use memory::MemoryResourceProvider;
pub use provider::{PlaceholderDef, ResourceProvider, SenderPools};
