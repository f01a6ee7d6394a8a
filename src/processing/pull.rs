use super::error::Error;
use super::signals::{CommentData, SignalMatcher};
use crate::ci::{CiAggregator, TestStatus};
use crate::config::AutolandConfig;
use crate::github::{GithubClient, NewStatus, PullRequestData, Status, StatusState};
use log::{info, warn};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Pipeline position of a pull request, least to most ripe. The ordering is
/// the primary component of the ranking key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    /// Disapproved, or out of retries after adverse statuses.
    Bad,
    /// The platform reports the pull request as definitively unmergeable.
    Stale,
    Discussing,
    Unreviewed,
    Approved,
    /// A trial merge is in flight, awaiting the CI verdict.
    Pending,
    /// CI verdict positive; ready to land.
    Tested,
    Closed,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Bad => "BAD",
            State::Stale => "STALE",
            State::Discussing => "DISCUSSING",
            State::Unreviewed => "UNREVIEWED",
            State::Approved => "APPROVED",
            State::Pending => "PENDING",
            State::Tested => "TESTED",
            State::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Runtime view of the configuration shared by every pull-request model.
pub struct Settings {
    pub bot: String,
    pub owner: String,
    pub repo: String,
    pub host: String,
    pub reviewers: HashSet<String>,
    pub ignored_users: HashSet<String>,
    pub matcher: SignalMatcher,
    pub test_ref: Option<String>,
    pub no_auto_merge: bool,
    pub delete_source_branch: bool,
}

impl Settings {
    /// `reviewers` is passed separately so the collaborator list can stand
    /// in for the configured one.
    pub fn from_config(config: &AutolandConfig, reviewers: Vec<String>) -> Self {
        Self {
            bot: config.gh_user.clone(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            host: config.gh_host.clone(),
            reviewers: reviewers.into_iter().collect(),
            ignored_users: config.ignored_users_in_comments.iter().cloned().collect(),
            matcher: SignalMatcher::new(
                &config.gh_user,
                &config.approval_tokens,
                &config.disapproval_tokens,
            ),
            test_ref: config.test_ref.clone(),
            no_auto_merge: config.no_auto_merge,
            delete_source_branch: config.delete_source_branch,
        }
    }
}

/// The observable inputs a state derivation reads, separated out so the
/// derivation stays a pure function of them.
#[derive(Debug, Clone, Default)]
pub struct PullInputs {
    pub head_comments: Vec<CommentData>,
    pub pull_comments: Vec<CommentData>,
    /// Self-authored statuses on the head revision, newest first.
    pub statuses: Vec<StatusState>,
    /// Candidate SHA parsed from the newest pending self-status.
    pub legacy_candidate: Option<String>,
}

lazy_static! {
    static ref CANDIDATE: Regex =
        Regex::new(r"^running tests for candidate ([0-9a-fA-F]{4,40})").unwrap();
}

impl PullInputs {
    fn from_statuses(statuses: &[Status]) -> (Vec<StatusState>, Option<String>) {
        let legacy_candidate = statuses
            .iter()
            .find(|status| status.state == StatusState::Pending)
            .and_then(|status| status.description.as_deref())
            .and_then(|description| CANDIDATE.captures(description))
            .map(|captures| captures[1].to_string());
        (statuses.iter().map(|status| status.state).collect(), legacy_candidate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// A forward step was taken and recorded on the remote.
    Advanced,
    /// Nothing to do until the remote changes.
    Waiting,
    /// The state admits no forward step.
    Skipped,
}

enum Candidate {
    Fresh(String),
    Stale,
}

/// One open pull request with everything observable loaded, its inferred
/// state, ranking key, and the `advance` operation.
pub struct PullRequestModel<G, C> {
    github: Arc<G>,
    ci: Arc<C>,
    settings: Arc<Settings>,
    data: PullRequestData,
    inputs: PullInputs,
}

impl<G, C> PullRequestModel<G, C>
where
    G: GithubClient + Send + Sync,
    C: CiAggregator + Send + Sync,
{
    pub fn new(
        github: Arc<G>,
        ci: Arc<C>,
        settings: Arc<Settings>,
        data: PullRequestData,
        inputs: PullInputs,
    ) -> Self {
        Self {
            github,
            ci,
            settings,
            data,
            inputs,
        }
    }

    /// Materializes the model from remote state: mergeability, both comment
    /// streams, and the self-authored statuses.
    pub async fn load(
        github: Arc<G>,
        ci: Arc<C>,
        settings: Arc<Settings>,
        num: u64,
    ) -> Result<Self, Error> {
        info!("loading pull #{}", num);
        let data = github.pull(num).await?;

        let (src_owner, src_repo) = source_coordinates(&settings, &data);
        info!("loading head comments on {}", data.head.sha);
        let head_comments = github
            .commit_comments(&src_owner, &src_repo, &data.head.sha)
            .await?
            .into_iter()
            .filter(|comment| settings.reviewers.contains(&comment.user.login))
            .filter(|comment| comment.is_unedited())
            .filter(|comment| !settings.ignored_users.contains(&comment.user.login))
            .map(|comment| {
                CommentData::new(
                    comment.created_at,
                    comment.user.login,
                    comment.body.unwrap_or_default(),
                )
            })
            .collect();

        info!("loading pull and issue comments on pull #{}", num);
        let mut raw_pull_comments = github.pull_comments(num).await?;
        raw_pull_comments.extend(github.issue_comments(num).await?);
        let pull_comments = raw_pull_comments
            .into_iter()
            .filter(|comment| !settings.ignored_users.contains(&comment.user.login))
            .map(|comment| {
                CommentData::new(
                    comment.created_at,
                    comment.user.login,
                    comment.body.unwrap_or_default(),
                )
            })
            .collect();

        info!("loading statuses of {}", data.head.sha);
        let self_statuses: Vec<_> = github
            .statuses(&data.head.sha)
            .await?
            .into_iter()
            .filter(|status| {
                status
                    .creator
                    .as_ref()
                    .map(|creator| creator.login == settings.bot)
                    .unwrap_or(false)
            })
            .collect();
        let (statuses, legacy_candidate) = PullInputs::from_statuses(&self_statuses);

        let inputs = PullInputs {
            head_comments,
            pull_comments,
            statuses,
            legacy_candidate,
        };
        Ok(Self::new(github, ci, settings, data, inputs))
    }

    pub fn num(&self) -> u64 {
        self.data.number
    }

    pub fn head_sha(&self) -> &str {
        &self.data.head.sha
    }

    pub fn target_ref(&self) -> &str {
        &self.data.base.name
    }

    pub fn src_ref(&self) -> &str {
        &self.data.head.name
    }

    pub fn title(&self) -> &str {
        self.data.title.as_deref().unwrap_or("")
    }

    pub fn body(&self) -> &str {
        self.data.body.as_deref().unwrap_or("")
    }

    pub fn src_owner(&self) -> String {
        source_coordinates(&self.settings, &self.data).0
    }

    pub fn src_repo(&self) -> String {
        source_coordinates(&self.settings, &self.data).1
    }

    /// The integration branch trial merges are written to.
    pub fn test_ref(&self) -> String {
        match &self.settings.test_ref {
            Some(name) => name.clone(),
            None => format!(
                "{}-integration-{}-{}",
                self.settings.bot,
                self.num(),
                self.src_ref()
            ),
        }
    }

    pub fn approvers(&self) -> Vec<String> {
        self.settings.matcher.approvers(
            &self.inputs.head_comments,
            &self.reviewer_thread_comments(),
            self.head_sha(),
        )
    }

    pub fn disapprovers(&self) -> Vec<String> {
        self.settings.matcher.disapprovers(
            &self.inputs.head_comments,
            &self.reviewer_thread_comments(),
            self.head_sha(),
        )
    }

    fn reviewer_thread_comments(&self) -> Vec<CommentData> {
        self.inputs
            .pull_comments
            .iter()
            .filter(|comment| self.settings.reviewers.contains(&comment.author))
            .cloned()
            .collect()
    }

    pub fn priority(&self) -> i64 {
        SignalMatcher::priority(&self.inputs.head_comments)
    }

    pub fn num_comments(&self) -> usize {
        self.inputs.head_comments.len() + self.inputs.pull_comments.len()
    }

    pub fn last_comment(&self) -> Option<&CommentData> {
        self.inputs
            .head_comments
            .iter()
            .chain(self.inputs.pull_comments.iter())
            .max_by_key(|comment| comment.created_at)
    }

    fn count(&self, state: StatusState) -> usize {
        self.inputs
            .statuses
            .iter()
            .filter(|&&s| s == state)
            .count()
    }

    fn retries(&self) -> usize {
        self.settings.matcher.retries(&self.inputs.head_comments)
    }

    /// Derives the state from the loaded inputs; first matching rule wins.
    pub fn current_state(&self) -> State {
        if self.data.is_closed() {
            return State::Closed;
        }
        let retries = self.retries();
        if self.count(StatusState::Error) + self.count(StatusState::Failure) > retries {
            return State::Bad;
        }
        if !self.disapprovers().is_empty() {
            return State::Bad;
        }
        if self.count(StatusState::Success) > 0 {
            return State::Tested;
        }
        // An unknown mergeability is trusted; the platform often reports
        // null for pull requests it has not computed yet.
        if self.data.mergeable == Some(false) {
            return State::Stale;
        }
        if !self.approvers().is_empty() {
            return if self.count(StatusState::Pending) <= retries {
                State::Approved
            } else {
                State::Pending
            };
        }
        if self.num_comments() > 0 {
            return State::Discussing;
        }
        State::Unreviewed
    }

    /// Ranking key: sorting ascending puts the pull request closest to
    /// landing last; ties break toward higher priority, then lower number.
    pub fn sort_key(&self) -> (State, i64, i64) {
        (self.current_state(), self.priority(), -(self.num() as i64))
    }

    fn short(&self) -> String {
        format!(
            "{}/{}/{} = {:.8}",
            self.src_owner(),
            self.src_repo(),
            self.src_ref(),
            self.head_sha()
        )
    }

    fn desc(&self) -> String {
        format!(
            "pull https://{}/{}/{}/pull/{} - {} - '{:.30}'",
            self.settings.host,
            self.settings.owner,
            self.settings.repo,
            self.num(),
            self.short(),
            self.title()
        )
    }

    fn commit_url(&self, sha: &str) -> String {
        format!(
            "https://{}/{}/{}/commit/{}",
            self.settings.host, self.settings.owner, self.settings.repo, sha
        )
    }

    async fn set_status(
        &self,
        state: StatusState,
        description: String,
        target_url: Option<String>,
    ) -> Result<(), Error> {
        info!("{} - setting status: {:?} ({})", self.short(), state, description);
        self.github
            .post_status(
                self.head_sha(),
                &NewStatus {
                    state,
                    description: Some(description),
                    target_url,
                },
            )
            .await?;
        Ok(())
    }

    /// Performs at most one forward step for the current state. Every step
    /// records its effect on the remote before returning, so the next run
    /// can reconstruct position from observable state alone.
    pub async fn advance(&self) -> Result<AdvanceOutcome, Error> {
        info!("considering {}", self.desc());
        match self.current_state() {
            State::Unreviewed | State::Discussing => {
                info!("{} - waiting on review", self.short());
                Ok(AdvanceOutcome::Waiting)
            }
            State::Approved => {
                info!("{} - found approval, advancing to test", self.short());
                self.start_trial().await
            }
            State::Pending => {
                info!("{} - found pending state, checking tests", self.short());
                self.check_tests().await
            }
            State::Tested => {
                info!("{} - tests successful, attempting landing", self.short());
                self.land().await
            }
            State::Bad | State::Stale | State::Closed => Ok(AdvanceOutcome::Skipped),
        }
    }

    /// APPROVED step: reset the integration branch onto the target tip and
    /// ask the platform for a trial merge of the head.
    async fn start_trial(&self) -> Result<AdvanceOutcome, Error> {
        let approvers = self.approvers().join(", ");
        self.github
            .post_commit_comment(
                self.head_sha(),
                &format!(
                    "saw approval from {}\nat https://{}/{}/{}/commit/{}",
                    approvers,
                    self.settings.host,
                    self.src_owner(),
                    self.src_repo(),
                    self.head_sha()
                ),
            )
            .await?;
        self.reset_test_ref().await?;

        let test_ref = self.test_ref();
        let message = format!(
            "Merge pull request #{} from {}/{}\n\n{}\n\nReviewed-by: {}",
            self.num(),
            self.src_owner(),
            self.src_ref(),
            self.title(),
            approvers
        );
        info!("merging {} into {}", self.short(), test_ref);
        match self.github.merge(&test_ref, self.head_sha(), &message).await {
            Ok(merge) => {
                // The description is a protocol contract: later runs parse
                // the candidate SHA back out of it.
                self.set_status(
                    StatusState::Pending,
                    format!("running tests for candidate {}", merge.sha),
                    Some(self.commit_url(&merge.sha)),
                )
                .await?;
                self.github
                    .post_commit_comment(
                        self.head_sha(),
                        &format!("{} merged ok, testing candidate = {:.8}", self.short(), merge.sha),
                    )
                    .await?;
                Ok(AdvanceOutcome::Advanced)
            }
            Err(e) if e.client_rejection() => {
                // Bitrot: the head no longer merges cleanly. Mark it and
                // wait for the contributor to rebase.
                let failure = format!("merging {} into {} failed", self.short(), test_ref);
                warn!("{}", failure);
                self.github
                    .post_commit_comment(self.head_sha(), &failure)
                    .await?;
                self.set_status(StatusState::Error, failure, None).await?;
                Ok(AdvanceOutcome::Advanced)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reset_test_ref(&self) -> Result<(), Error> {
        let test_ref = self.test_ref();
        let target_tip = self.github.get_ref(self.target_ref()).await?.object.sha;
        info!(
            "resetting {} to {} = {:.8}",
            test_ref,
            self.target_ref(),
            target_tip
        );
        match self.github.patch_ref(&test_ref, &target_tip, true).await {
            Ok(_) => Ok(()),
            Err(e) if e.not_found() => {
                self.github.create_ref(&test_ref, &target_tip).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// PENDING step: recover the candidate, check freshness, and read the
    /// CI verdict for it.
    async fn check_tests(&self) -> Result<AdvanceOutcome, Error> {
        let candidate = match self.fresh_candidate().await? {
            Candidate::Fresh(sha) => sha,
            Candidate::Stale => {
                info!("{} - candidate went stale, restarting trial", self.short());
                return self.start_trial().await;
            }
        };
        let status = match self.ci.test_status(&candidate).await {
            Ok(status) => status,
            Err(e) => {
                // CI uncertainty is never a failure; stay pending.
                warn!("{} - CI query failed ({}), waiting", self.short(), e);
                return Ok(AdvanceOutcome::Waiting);
            }
        };
        match status {
            TestStatus::Pass {
                principal,
                auxiliary,
            } => {
                info!("{} - tests passed, marking success", self.short());
                let mut comment = String::from("all tests pass:");
                for url in &principal {
                    comment += &format!("\nsuccess: {}", url);
                }
                for url in &auxiliary {
                    comment += &format!("\nwarning: {}", url);
                }
                comment.push('\n');
                self.github
                    .post_commit_comment(self.head_sha(), &comment)
                    .await?;
                self.set_status(
                    StatusState::Success,
                    "all tests passed".into(),
                    principal.first().cloned(),
                )
                .await?;
                Ok(AdvanceOutcome::Advanced)
            }
            TestStatus::Fail {
                principal,
                auxiliary,
            } => {
                info!("{} - tests failed, marking failure", self.short());
                let mut comment = String::from("some tests failed:");
                for url in &principal {
                    comment += &format!("\nfailure: {}", url);
                }
                for url in &auxiliary {
                    comment += &format!("\nexception: {}", url);
                }
                comment.push('\n');
                self.github
                    .post_commit_comment(self.head_sha(), &comment)
                    .await?;
                self.set_status(
                    StatusState::Failure,
                    "some tests failed".into(),
                    principal.first().cloned(),
                )
                .await?;
                Ok(AdvanceOutcome::Advanced)
            }
            TestStatus::Waiting => {
                info!("{} - no info yet, waiting on tests", self.short());
                Ok(AdvanceOutcome::Waiting)
            }
        }
    }

    /// TESTED step: fast-forward the target onto the verified candidate.
    async fn land(&self) -> Result<AdvanceOutcome, Error> {
        if self.settings.no_auto_merge
            && !self.settings.matcher.merge_requested(&self.inputs.head_comments)
        {
            info!("{} - waiting for an explicit merge request", self.short());
            return Ok(AdvanceOutcome::Waiting);
        }
        let candidate = match self.fresh_candidate().await? {
            Candidate::Fresh(sha) => sha,
            Candidate::Stale => {
                info!("{} - candidate went stale, restarting trial", self.short());
                return self.start_trial().await;
            }
        };
        let step = format!(
            "fast-forwarding {} to {} = {:.8}",
            self.target_ref(),
            self.test_ref(),
            candidate
        );
        info!("{}", step);
        // Non-force update: the platform rejects it if anything else landed
        // on the target meanwhile.
        match self.github.patch_ref(self.target_ref(), &candidate, false).await {
            Ok(_) => {}
            Err(e) if e.client_rejection() => {
                let failure = format!("{} failed", step);
                warn!("{}", failure);
                self.github
                    .post_commit_comment(self.head_sha(), &failure)
                    .await?;
                self.set_status(StatusState::Error, failure, None).await?;
                return Ok(AdvanceOutcome::Advanced);
            }
            Err(e) => return Err(e.into()),
        }
        self.github
            .post_commit_comment(self.head_sha(), &step)
            .await?;

        if self.settings.test_ref.is_none() {
            // Derived integration branches are scratch space; clean up.
            match self.github.delete_ref(&self.test_ref()).await {
                Ok(()) => {}
                Err(e) if e.not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        if self.settings.delete_source_branch {
            match self
                .github
                .delete_branch(&self.src_owner(), &self.src_repo(), self.src_ref())
                .await
            {
                Ok(()) => {}
                Err(e) if e.not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        match self.github.close_pull(self.num()).await {
            Ok(_) => {}
            Err(e) if e.client_rejection() => {
                info!("closing failed; auto-closed after merge?");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(AdvanceOutcome::Advanced)
    }

    /// Recovers the candidate merge and verifies freshness: the candidate
    /// must have exactly the current target tip and the head as parents.
    /// The integration-branch tip is authoritative; the legacy pending
    /// status description is the fallback when the ref is gone.
    async fn fresh_candidate(&self) -> Result<Candidate, Error> {
        let tip = match self.github.get_ref(&self.test_ref()).await {
            Ok(git_ref) => Some(git_ref.object.sha),
            Err(e) if e.not_found() => None,
            Err(e) => return Err(e.into()),
        };
        let candidate = match tip.or_else(|| self.inputs.legacy_candidate.clone()) {
            Some(sha) => sha,
            None => return Ok(Candidate::Stale),
        };
        let commit = match self.github.commit(&candidate).await {
            Ok(commit) => commit,
            Err(e) if e.not_found() => return Ok(Candidate::Stale),
            Err(e) => return Err(e.into()),
        };
        let target_tip = self.github.get_ref(self.target_ref()).await?.object.sha;
        let parents: Vec<_> = commit.parents.iter().map(|parent| parent.sha.as_str()).collect();
        let fresh = parents.len() == 2
            && parents.contains(&target_tip.as_str())
            && parents.contains(&self.head_sha());
        if fresh {
            // The commit lookup resolves legacy short prefixes to the full
            // SHA as a side effect.
            Ok(Candidate::Fresh(commit.sha))
        } else {
            Ok(Candidate::Stale)
        }
    }
}

/// A deleted fork leaves `head.repo` empty; the head commit is still
/// reachable through the destination repository.
fn source_coordinates(settings: &Settings, data: &PullRequestData) -> (String, String) {
    match &data.head.repo {
        Some(repo) => (repo.owner.login.clone(), repo.name.clone()),
        None => (settings.owner.clone(), settings.repo.clone()),
    }
}
