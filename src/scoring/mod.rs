/// Points formulas, rank tiers and the wallet score engine
pub mod types;
pub mod formula;
pub mod rank;
pub mod engine;

pub use engine::{ScoreEngine, ScoreError};
pub use formula::{CanonicalFormula, ScoreFormula, ScoreInputs};
pub use rank::{resolve_rank, RankResolver};
pub use types::{MetricEntry, NativeEntry, PlatformEntry, ScoreBreakdown, WalletScore};
