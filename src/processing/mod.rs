pub mod director;
pub mod error;
pub mod pull;
pub mod signals;
pub mod snapshot;

pub use director::{Director, RunSummary};
pub use error::Error;
pub use pull::{AdvanceOutcome, PullRequestModel, Settings, State};
pub use signals::{CommentData, SignalMatcher};
