//! Download management
//!
//! Scope filtering, per-part request building, part execution with
//! progress reporting, and the cycle that ties them to packaging.

pub mod executor;
pub mod manager;
pub mod progress;
pub mod request;
pub mod scope;

// Re-export commonly used types
pub use executor::{DownloadExecutor, PartOutcome};
pub use manager::{CycleStage, DownloadManager, DownloadOptions, DownloadSummary};
pub use progress::{PartProgress, PartState, ProgressCallback};
pub use request::{PartRequest, PartRequestBuilder};
pub use scope::ScopeFilter;
