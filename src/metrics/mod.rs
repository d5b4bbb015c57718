/// Admin-configured metrics and the analytics slug surface
pub mod engine;
pub mod analytics;

pub use analytics::{AnalyticsError, AnalyticsService, WalletAnalytics};
pub use engine::{ContractAggregate, FunctionBreakdown, MetricEngine, MetricResult};
