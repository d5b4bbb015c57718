// Shared primitives, configuration and storage
pub mod core;
pub mod config;
pub mod database;
pub mod util;

// Scoring pipeline
pub mod enrichment;
pub mod extractors;
pub mod holdings;
pub mod metrics;
pub mod scoring;

// HTTP surface
pub mod handlers;

pub use crate::core::{AddressError, WalletAddress};
pub use scoring::{ScoreEngine, WalletScore};
