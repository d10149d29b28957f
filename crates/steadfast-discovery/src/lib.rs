//! # steadfast-discovery
//!
//! Keeps a list of service endpoints fresh by re-reading a
//! [`DiscoverySource`] under the steadfast retry engine.
//!
//! - [`Endpoint`] and [`FileSource`] for YAML/JSON endpoint lists
//! - [`SourceErrorClassifier`] separating transient source failures from
//!   permanent ones
//! - [`Refresher`] holding the latest [`Snapshot`], refreshed once or
//!   periodically until cancelled

mod classifier;
mod endpoint;
mod error;
mod refresher;
mod source;

pub use classifier::SourceErrorClassifier;
pub use endpoint::{Endpoint, EndpointList};
pub use error::{DiscoveryError, SourceError};
pub use refresher::{Refresher, Snapshot, REFRESH_OPERATION};
pub use source::{DiscoverySource, FileSource};
