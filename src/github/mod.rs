pub mod client;
pub mod models;

pub use client::{DefaultGithubClient, GithubClient};
pub use models::{
    Branch, CheckRun, CheckRunConclusion, CheckRunList, CheckRunStatus, Comment, Commit,
    CommitParent, GitObject, GitRef, MergeCommit, NewStatus, PullRequestData, PullRequestState,
    Repository, Status, StatusState, User,
};

#[cfg(test)]
pub use client::MockGithubClient;
