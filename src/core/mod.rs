pub mod types;
pub mod constants;
pub mod units;
pub mod cache;
pub mod single_flight;

pub use types::*;
pub use constants::*;
pub use cache::{spawn_sweeper, Sweep, TtlCache};
pub use single_flight::SingleFlight;
