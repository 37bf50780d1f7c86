//! Kindle delivery API client
//!
//! Authentication seam, client configuration, correlation ids, response
//! context decoding, manifest resolution and library listing.

pub mod auth;
pub mod client;
pub mod context;
pub mod correlation;
pub mod library;
pub mod locale;
pub mod manifest;

// Re-export commonly used types
pub use auth::{Authenticator, Identity};
pub use client::{ClientConfig, KindleClient};
pub use context::{CborContextDecoder, ContextDecoder, ContextMap, ResponseContext};
pub use correlation::build_correlation_id;
pub use library::{Library, LibraryBook, LibraryOptions};
pub use locale::Locale;
pub use manifest::{Endpoint, Manifest, Requirement, Resource, ResourceType};
