// bachpan-core: image similarity matching engine shared by the server and CLI.

pub mod catalog;
pub mod config;
pub mod embedding;
pub mod error;
pub mod rank;
pub mod reference;
pub mod service;
pub mod similarity;
pub mod staging;

// Test utilities - always available for use by bachpan-server and tests
pub mod testutil;

pub use error::MatchError;
pub use rank::MatchResult;
pub use service::{MatchOptions, MatchService, ReadinessMode, ServiceState};
