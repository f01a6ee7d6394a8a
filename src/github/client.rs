use super::models::{
    CheckRunList, Comment, Commit, GitRef, MergeCommit, NewStatus, PullRequestData, Status, User,
};
use crate::client::{ApiClient, Result};
use async_trait::async_trait;
use serde_derive::Serialize;

/// The remote-platform capability consumed by the core. Implementations are
/// bound to the destination repository; operations against a contributor's
/// repository take explicit coordinates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GithubClient {
    async fn open_pulls(&self, page: u32) -> Result<Vec<PullRequestData>>;
    async fn pull(&self, num: u64) -> Result<PullRequestData>;
    async fn commit_comments(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<Comment>>;
    async fn pull_comments(&self, num: u64) -> Result<Vec<Comment>>;
    async fn issue_comments(&self, num: u64) -> Result<Vec<Comment>>;
    async fn statuses(&self, sha: &str) -> Result<Vec<Status>>;
    async fn post_status(&self, sha: &str, status: &NewStatus) -> Result<Status>;
    async fn post_commit_comment(&self, sha: &str, body: &str) -> Result<Comment>;
    async fn get_ref(&self, name: &str) -> Result<GitRef>;
    async fn create_ref(&self, name: &str, sha: &str) -> Result<GitRef>;
    async fn patch_ref(&self, name: &str, sha: &str, force: bool) -> Result<GitRef>;
    async fn delete_ref(&self, name: &str) -> Result<()>;
    async fn delete_branch(&self, owner: &str, repo: &str, name: &str) -> Result<()>;
    async fn commit(&self, sha: &str) -> Result<Commit>;
    async fn merge(&self, base: &str, head: &str, commit_message: &str) -> Result<MergeCommit>;
    async fn close_pull(&self, num: u64) -> Result<PullRequestData>;
    async fn collaborators(&self) -> Result<Vec<User>>;
    async fn check_runs(&self, sha: &str) -> Result<CheckRunList>;
}

#[derive(Clone)]
pub struct DefaultGithubClient {
    client: ApiClient,
    api_base: String,
    owner: String,
    repo: String,
}

impl DefaultGithubClient {
    pub fn new<U, A, O, R>(username: U, password: Option<String>, api_base: A, owner: O, repo: R) -> Self
    where
        U: Into<String>,
        A: Into<String>,
        O: Into<String>,
        R: Into<String>,
    {
        let username = username.into();
        let client = match password {
            Some(password) => ApiClient::from_credentials(username, password),
            None => ApiClient::from_username(username),
        };
        Self {
            client,
            api_base: api_base.into(),
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    fn repo_url(&self, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.owner, self.repo, rest
        )
    }
}

#[async_trait]
impl GithubClient for DefaultGithubClient {
    async fn open_pulls(&self, page: u32) -> Result<Vec<PullRequestData>> {
        let url = self.repo_url(&format!("pulls?state=open&per_page=100&page={}", page));
        self.client.get(&url).await
    }

    async fn pull(&self, num: u64) -> Result<PullRequestData> {
        let url = self.repo_url(&format!("pulls/{}", num));
        self.client.get(&url).await
    }

    async fn commit_comments(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<Comment>> {
        let url = format!(
            "{}/repos/{}/{}/commits/{}/comments",
            self.api_base, owner, repo, sha
        );
        self.client.get(&url).await
    }

    async fn pull_comments(&self, num: u64) -> Result<Vec<Comment>> {
        let url = self.repo_url(&format!("pulls/{}/comments", num));
        self.client.get(&url).await
    }

    async fn issue_comments(&self, num: u64) -> Result<Vec<Comment>> {
        let url = self.repo_url(&format!("issues/{}/comments", num));
        self.client.get(&url).await
    }

    async fn statuses(&self, sha: &str) -> Result<Vec<Status>> {
        let url = self.repo_url(&format!("statuses/{}", sha));
        self.client.get(&url).await
    }

    async fn post_status(&self, sha: &str, status: &NewStatus) -> Result<Status> {
        let url = self.repo_url(&format!("statuses/{}", sha));
        self.client.post(&url, status).await
    }

    async fn post_commit_comment(&self, sha: &str, body: &str) -> Result<Comment> {
        let url = self.repo_url(&format!("commits/{}/comments", sha));
        let body = CommentRequest { body: body.into() };
        self.client.post(&url, &body).await
    }

    async fn get_ref(&self, name: &str) -> Result<GitRef> {
        let url = self.repo_url(&format!("git/refs/heads/{}", name));
        self.client.get(&url).await
    }

    async fn create_ref(&self, name: &str, sha: &str) -> Result<GitRef> {
        let url = self.repo_url("git/refs");
        let body = CreateRefRequest {
            name: format!("refs/heads/{}", name),
            sha: sha.into(),
        };
        self.client.post(&url, &body).await
    }

    async fn patch_ref(&self, name: &str, sha: &str, force: bool) -> Result<GitRef> {
        let url = self.repo_url(&format!("git/refs/heads/{}", name));
        let body = PatchRefRequest {
            sha: sha.into(),
            force,
        };
        self.client.patch(&url, &body).await
    }

    async fn delete_ref(&self, name: &str) -> Result<()> {
        let url = self.repo_url(&format!("git/refs/heads/{}", name));
        self.client.delete(&url).await
    }

    async fn delete_branch(&self, owner: &str, repo: &str, name: &str) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/git/refs/heads/{}",
            self.api_base, owner, repo, name
        );
        self.client.delete(&url).await
    }

    async fn commit(&self, sha: &str) -> Result<Commit> {
        let url = self.repo_url(&format!("commits/{}", sha));
        self.client.get(&url).await
    }

    async fn merge(&self, base: &str, head: &str, commit_message: &str) -> Result<MergeCommit> {
        let url = self.repo_url("merges");
        let body = MergeRequest {
            base: base.into(),
            head: head.into(),
            commit_message: commit_message.into(),
        };
        self.client.post(&url, &body).await
    }

    async fn close_pull(&self, num: u64) -> Result<PullRequestData> {
        let url = self.repo_url(&format!("pulls/{}", num));
        let body = ClosePullRequest { state: "closed" };
        self.client.patch(&url, &body).await
    }

    async fn collaborators(&self) -> Result<Vec<User>> {
        let url = self.repo_url("collaborators?per_page=100");
        self.client.get(&url).await
    }

    async fn check_runs(&self, sha: &str) -> Result<CheckRunList> {
        let url = self.repo_url(&format!("commits/{}/check-runs?per_page=100", sha));
        self.client.get(&url).await
    }
}

#[derive(Serialize, Debug, PartialEq)]
struct CommentRequest {
    body: String,
}

#[derive(Serialize, Debug, PartialEq)]
struct CreateRefRequest {
    #[serde(rename = "ref")]
    name: String,
    sha: String,
}

#[derive(Serialize, Debug, PartialEq)]
struct PatchRefRequest {
    sha: String,
    force: bool,
}

#[derive(Serialize, Debug, PartialEq)]
struct MergeRequest {
    base: String,
    head: String,
    commit_message: String,
}

#[derive(Serialize, Debug, PartialEq)]
struct ClosePullRequest {
    state: &'static str,
}
