use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub enum PullRequestState {
    #[serde(rename = "open")]
    Open,

    #[serde(rename = "closed")]
    Closed,

    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub login: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Repository {
    pub name: String,
    pub owner: User,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Branch {
    pub sha: String,

    #[serde(rename = "ref")]
    pub name: String,

    // Absent when the fork backing the pull request has been deleted.
    pub repo: Option<Repository>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PullRequestData {
    pub number: u64,
    pub state: PullRequestState,
    pub title: Option<String>,
    pub body: Option<String>,
    pub head: Branch,
    pub base: Branch,

    /// Tri-state mergeability hint. The platform often reports `null` here;
    /// only an explicit `false` means unmergeable.
    #[serde(default)]
    pub mergeable: Option<bool>,
}

impl PullRequestData {
    pub fn is_closed(&self) -> bool {
        matches!(self.state, PullRequestState::Closed)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub user: User,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Comment {
    /// Edited comments lose their verdict value: only a comment whose body
    /// still matches its creation time is trusted.
    pub fn is_unedited(&self) -> bool {
        match self.updated_at {
            Some(updated_at) => updated_at == self.created_at,
            None => true,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusState {
    #[serde(rename = "pending")]
    Pending,

    #[serde(rename = "success")]
    Success,

    #[serde(rename = "failure")]
    Failure,

    #[serde(rename = "error")]
    Error,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Status {
    pub state: StatusState,
    pub description: Option<String>,
    pub target_url: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    pub creator: Option<User>,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct NewStatus {
    pub state: StatusState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GitObject {
    pub sha: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
    pub object: GitObject,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CommitParent {
    pub sha: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Commit {
    pub sha: String,
    #[serde(default)]
    pub parents: Vec<CommitParent>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MergeCommit {
    pub sha: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub enum CheckRunStatus {
    #[serde(rename = "queued")]
    Queued,

    #[serde(rename = "in_progress")]
    InProgress,

    #[serde(rename = "completed")]
    Completed,

    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub enum CheckRunConclusion {
    #[serde(rename = "success")]
    Success,

    #[serde(rename = "failure")]
    Failure,

    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CheckRun {
    pub name: String,
    pub status: CheckRunStatus,
    pub conclusion: Option<CheckRunConclusion>,
    pub html_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CheckRunList {
    #[serde(default)]
    pub check_runs: Vec<CheckRun>,
}
