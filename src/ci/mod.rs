pub mod aggregator;
pub mod buildbot;
pub mod models;

pub use aggregator::{aggregate, Backend, CiAggregator, DefaultCiAggregator};
pub use buildbot::BuildbotClient;
pub use models::{BackendReport, Build, BuildResult, TestStatus};

#[cfg(test)]
pub use aggregator::MockCiAggregator;
