//! Content source abstraction.
//!
//! This module provides a `ContentSource` trait for listing channel items
//! and the YouTube Data API implementation.

mod config;
mod traits;
mod youtube;

pub use config::{SourceBackend, SourceConfig, YouTubeConfig};
pub use traits::{ContentSource, SourceError, SourcePage};
pub use youtube::YouTubeSource;
