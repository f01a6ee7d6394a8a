use super::buildbot::BuildbotClient;
use super::models::{BackendReport, TestStatus};
use crate::client::Result;
use crate::github::{
    CheckRunConclusion, CheckRunList, CheckRunStatus, GithubClient, Status, StatusState,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Produces the tri-state test verdict for a revision.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CiAggregator {
    async fn test_status(&self, sha: &str) -> Result<TestStatus>;
}

/// The configured CI backends. All enabled backends contribute to one
/// aggregate: a failure anywhere fails the revision, and a pass requires
/// every backend to be complete and passing.
pub enum Backend {
    Buildbot(BuildbotClient),
    CommitStatuses,
    CheckRuns,
}

pub struct DefaultCiAggregator<G> {
    github: Arc<G>,
    backends: Vec<Backend>,
}

impl<G: GithubClient + Send + Sync> DefaultCiAggregator<G> {
    pub fn new(github: Arc<G>, backends: Vec<Backend>) -> Self {
        Self { github, backends }
    }

    async fn backend_report(&self, backend: &Backend, sha: &str) -> Result<BackendReport> {
        match backend {
            Backend::Buildbot(buildbot) => buildbot.report(sha).await,
            Backend::CommitStatuses => Ok(status_report(&self.github.statuses(sha).await?)),
            Backend::CheckRuns => Ok(check_run_report(&self.github.check_runs(sha).await?)),
        }
    }
}

#[async_trait]
impl<G: GithubClient + Send + Sync> CiAggregator for DefaultCiAggregator<G> {
    async fn test_status(&self, sha: &str) -> Result<TestStatus> {
        let mut reports = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            reports.push(self.backend_report(backend, sha).await?);
        }
        Ok(aggregate(reports))
    }
}

/// Folds per-backend reports into the final verdict. Missing data never
/// fails a revision: without a failure, anything short of a full set of
/// passing reports stays waiting.
pub fn aggregate(reports: Vec<BackendReport>) -> TestStatus {
    let mut passes = Vec::new();
    let mut warnings = Vec::new();
    let mut failures = Vec::new();
    let mut exceptions = Vec::new();
    let mut incomplete = reports.is_empty();
    for report in reports {
        passes.extend(report.passes);
        warnings.extend(report.warnings);
        failures.extend(report.failures);
        exceptions.extend(report.exceptions);
        incomplete |= report.incomplete;
    }
    if !failures.is_empty() || !exceptions.is_empty() {
        TestStatus::Fail {
            principal: failures,
            auxiliary: exceptions,
        }
    } else if incomplete || (passes.is_empty() && warnings.is_empty()) {
        TestStatus::Waiting
    } else {
        TestStatus::Pass {
            principal: passes,
            auxiliary: warnings,
        }
    }
}

/// Buckets platform commit statuses. Statuses accumulate per context with
/// the newest first; only the newest entry of each context counts.
fn status_report(statuses: &[Status]) -> BackendReport {
    let mut latest: HashMap<&str, &Status> = HashMap::new();
    for status in statuses {
        let context = status.context.as_deref().unwrap_or("default");
        latest.entry(context).or_insert(status);
    }
    let mut report = BackendReport {
        incomplete: latest.is_empty(),
        ..BackendReport::default()
    };
    for (context, status) in latest {
        let url = status
            .target_url
            .clone()
            .unwrap_or_else(|| context.to_string());
        match status.state {
            StatusState::Success => report.passes.push(url),
            StatusState::Failure => report.failures.push(url),
            StatusState::Error => report.exceptions.push(url),
            StatusState::Pending => report.incomplete = true,
        }
    }
    report
}

/// Buckets check runs, newest run per check name.
fn check_run_report(list: &CheckRunList) -> BackendReport {
    let mut latest = HashMap::new();
    for run in &list.check_runs {
        latest.entry(run.name.as_str()).or_insert(run);
    }
    let mut report = BackendReport {
        incomplete: latest.is_empty(),
        ..BackendReport::default()
    };
    for run in latest.values() {
        let url = run.html_url.clone().unwrap_or_else(|| run.name.clone());
        if run.status != CheckRunStatus::Completed {
            report.incomplete = true;
            continue;
        }
        match run.conclusion {
            Some(CheckRunConclusion::Success) => report.passes.push(url),
            Some(CheckRunConclusion::Failure) => report.failures.push(url),
            _ => report.exceptions.push(url),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing(urls: &[&str]) -> BackendReport {
        BackendReport {
            passes: urls.iter().map(|u| u.to_string()).collect(),
            ..BackendReport::default()
        }
    }

    fn failing(urls: &[&str]) -> BackendReport {
        BackendReport {
            failures: urls.iter().map(|u| u.to_string()).collect(),
            ..BackendReport::default()
        }
    }

    #[test]
    fn no_reports_is_waiting() {
        assert_eq!(aggregate(vec![]), TestStatus::Waiting);
    }

    #[test]
    fn all_passing_is_pass() {
        let status = aggregate(vec![passing(&["u1"]), passing(&["u2"])]);
        assert_eq!(
            status,
            TestStatus::Pass {
                principal: vec!["u1".into(), "u2".into()],
                auxiliary: vec![],
            }
        );
    }

    #[test]
    fn any_failure_is_fail() {
        let status = aggregate(vec![passing(&["u1"]), failing(&["u2"])]);
        assert_eq!(
            status,
            TestStatus::Fail {
                principal: vec!["u2".into()],
                auxiliary: vec![],
            }
        );
    }

    #[test]
    fn incomplete_backend_is_waiting() {
        let incomplete = BackendReport {
            incomplete: true,
            ..passing(&["u1"])
        };
        assert_eq!(aggregate(vec![incomplete]), TestStatus::Waiting);
    }

    #[test]
    fn exceptions_fail_as_auxiliary() {
        let report = BackendReport {
            exceptions: vec!["boom".into()],
            incomplete: true,
            ..BackendReport::default()
        };
        assert_eq!(
            aggregate(vec![report]),
            TestStatus::Fail {
                principal: vec![],
                auxiliary: vec!["boom".into()],
            }
        );
    }

    // Adding a passing report never demotes a pass; adding a failing report
    // never promotes to pass.
    #[test]
    fn aggregation_is_monotone() {
        let base = vec![passing(&["u1"])];
        let mut more = base.clone();
        more.push(passing(&["u2"]));
        assert!(matches!(aggregate(more), TestStatus::Pass { .. }));

        let failed = vec![failing(&["u2"])];
        let mut with_pass = failed.clone();
        with_pass.push(passing(&["u3"]));
        assert!(matches!(aggregate(failed), TestStatus::Fail { .. }));
        assert!(matches!(aggregate(with_pass), TestStatus::Fail { .. }));

        let waiting = vec![BackendReport {
            incomplete: true,
            ..BackendReport::default()
        }];
        let mut with_fail = waiting.clone();
        with_fail.push(failing(&["u4"]));
        assert_eq!(aggregate(waiting), TestStatus::Waiting);
        assert!(matches!(aggregate(with_fail), TestStatus::Fail { .. }));
    }

    fn status(raw: &str) -> Status {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn statuses_deduplicate_by_context() {
        let statuses = vec![
            status(
                r#"{"state": "success", "description": null, "context": "ci/build",
                    "target_url": "https://ci.example.org/2", "creator": {"login": "ci"}}"#,
            ),
            status(
                r#"{"state": "failure", "description": null, "context": "ci/build",
                    "target_url": "https://ci.example.org/1", "creator": {"login": "ci"}}"#,
            ),
        ];
        let report = status_report(&statuses);
        assert_eq!(report.passes, vec!["https://ci.example.org/2"]);
        assert!(report.failures.is_empty());
        assert!(!report.incomplete);
    }

    #[test]
    fn pending_status_is_incomplete() {
        let statuses = vec![status(
            r#"{"state": "pending", "description": null, "context": "ci/build",
                "target_url": null, "creator": null}"#,
        )];
        let report = status_report(&statuses);
        assert!(report.incomplete);
        assert_eq!(aggregate(vec![report]), TestStatus::Waiting);
    }

    #[test]
    fn no_statuses_is_incomplete() {
        assert!(status_report(&[]).incomplete);
    }

    #[test]
    fn check_runs_bucket_by_conclusion() {
        let list: CheckRunList = serde_json::from_str(
            r#"{
                "check_runs": [
                    {"name": "unit", "status": "completed", "conclusion": "success",
                     "html_url": "https://github.com/acme/widgets/runs/1"},
                    {"name": "lint", "status": "completed", "conclusion": "cancelled",
                     "html_url": "https://github.com/acme/widgets/runs/2"}
                ]
            }"#,
        )
        .unwrap();
        let report = check_run_report(&list);
        assert_eq!(report.passes, vec!["https://github.com/acme/widgets/runs/1"]);
        assert_eq!(
            report.exceptions,
            vec!["https://github.com/acme/widgets/runs/2"]
        );
    }

    #[test]
    fn running_check_is_incomplete() {
        let list: CheckRunList = serde_json::from_str(
            r#"{
                "check_runs": [
                    {"name": "unit", "status": "in_progress", "conclusion": null,
                     "html_url": null}
                ]
            }"#,
        )
        .unwrap();
        assert!(check_run_report(&list).incomplete);
    }
}
