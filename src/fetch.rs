//! Resource fetching: per-attempt HTTP transfer with timeout classification,
//! atomic destination writes, and the primary/fallback strategy built on top.

pub mod attempt;
pub mod destination;
pub mod http;
pub mod options;
pub mod strategy;

pub use attempt::AttemptError;
pub use destination::PartialFile;
pub use http::{HttpFetcher, ResourceFetcher};
pub use options::FetchOptions;
pub use strategy::{FallbackFetcher, FetchStrategy};
