use super::error::Error;
use super::pull::PullRequestModel;
use crate::ci::CiAggregator;
use crate::github::GithubClient;
use chrono::{DateTime, Utc};
use serde_derive::Serialize;
use std::path::Path;

/// One pull request in the state-of-world artifact.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub num: u64,
    pub title: String,
    pub body: String,
    pub prio: i64,
    pub src_owner: String,
    pub src_repo: String,
    pub dst_owner: String,
    pub dst_repo: String,
    pub num_comments: usize,
    pub last_comment: (String, String, String),
    pub approvals: Vec<String>,
    #[serde(rename = "ref")]
    pub src_ref: String,
    pub sha: String,
    pub state: String,
}

impl SnapshotRecord {
    pub fn from_model<G, C>(model: &PullRequestModel<G, C>, owner: &str, repo: &str) -> Self
    where
        G: GithubClient + Send + Sync,
        C: CiAggregator + Send + Sync,
    {
        let last_comment = match model.last_comment() {
            Some(comment) => (
                comment.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                comment.author.clone(),
                comment.body.clone(),
            ),
            None => (String::new(), String::new(), String::new()),
        };
        Self {
            num: model.num(),
            title: model.title().into(),
            body: model.body().into(),
            prio: model.priority(),
            src_owner: model.src_owner(),
            src_repo: model.src_repo(),
            dst_owner: owner.into(),
            dst_repo: repo.into(),
            num_comments: model.num_comments(),
            last_comment,
            approvals: model.approvers(),
            src_ref: model.src_ref().into(),
            sha: model.head_sha().into(),
            state: model.current_state().name().into(),
        }
    }
}

/// The artifact is a script fragment: an `updated` stamp followed by the
/// JSON document keyed by repo name.
pub fn render(
    repo: &str,
    records: &[SnapshotRecord],
    updated: DateTime<Utc>,
) -> Result<String, Error> {
    let document = serde_json::json!({ repo: records });
    Ok(format!(
        "var updated = new Date(\"{}\");\nvar pulls = {};\n",
        updated.format("%Y-%m-%dT%H:%M:%SZ"),
        serde_json::to_string(&document)?
    ))
}

pub fn write<G, C>(
    path: &Path,
    owner: &str,
    repo: &str,
    models: &[PullRequestModel<G, C>],
) -> Result<(), Error>
where
    G: GithubClient + Send + Sync,
    C: CiAggregator + Send + Sync,
{
    let records: Vec<_> = models
        .iter()
        .map(|model| SnapshotRecord::from_model(model, owner, repo))
        .collect();
    std::fs::write(path, render(repo, &records, Utc::now())?)?;
    Ok(())
}
