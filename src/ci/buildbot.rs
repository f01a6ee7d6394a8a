use super::models::{BackendReport, Build, BuildResult};
use crate::client::{Error, Result};
use log::info;
use reqwest::ClientBuilder;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Queries a buildbot instance for the most recent builds of each configured
/// builder and buckets them by result for a given revision. Requests are
/// never retried: an unreachable CI leaves the verdict waiting, and the next
/// run asks again.
pub struct BuildbotClient {
    client: reqwest::Client,
    url: String,
    builders: Vec<String>,
    nbuilds: u32,
}

impl BuildbotClient {
    pub fn new<U: Into<String>>(url: U, builders: Vec<String>, nbuilds: u32) -> Self {
        let client = ClientBuilder::new()
            .user_agent("autoland")
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap();
        Self {
            client,
            url: url.into(),
            builders,
            nbuilds,
        }
    }

    pub async fn report(&self, sha: &str) -> Result<BackendReport> {
        let mut report = BackendReport::default();
        for builder in &self.builders {
            let builds = self.builder_builds(builder).await?;
            match self.latest_result(&builds, sha) {
                Some((build, result)) => {
                    let url = format!("{}/builders/{}/builds/{}", self.url, builder, build.number);
                    match result {
                        BuildResult::Success => report.passes.push(url),
                        BuildResult::Warnings => report.warnings.push(url),
                        BuildResult::Failure => report.failures.push(url),
                        BuildResult::Exception => report.exceptions.push(url),
                        // Skipped and unknown codes leave the builder
                        // unreported; the aggregate stays waiting.
                        BuildResult::Skipped | BuildResult::Retry | BuildResult::Other => {
                            report.incomplete = true
                        }
                    }
                }
                None => {
                    info!("missing info for builder {} on {}", builder, sha);
                    report.incomplete = true;
                }
            }
        }
        Ok(report)
    }

    /// The newest finished build of `sha`, ignoring builds superseded by a
    /// retry and builds still in progress.
    fn latest_result<'a>(&self, builds: &'a [Build], sha: &str) -> Option<(&'a Build, BuildResult)> {
        builds
            .iter()
            .filter(|build| build.revision() == Some(sha))
            .filter_map(|build| build.result().map(|result| (build, result)))
            .find(|(_, result)| *result != BuildResult::Retry)
    }

    /// Fetches the last `nbuilds` builds of a builder, newest first. Entries
    /// that fail to decode (holes in buildbot's history) are skipped.
    async fn builder_builds(&self, builder: &str) -> Result<Vec<Build>> {
        let selects: Vec<_> = (1..=self.nbuilds)
            .map(|n| format!("select=-{}", n))
            .collect();
        let url = format!(
            "{}/json/builders/{}/builds?{}",
            self.url,
            builder,
            selects.join("&")
        );
        info!("fetching {}", url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Http(response.status()));
        }
        let raw: HashMap<String, Value> = response.json().await?;
        let mut entries: Vec<_> = raw
            .into_iter()
            .filter_map(|(key, value)| Some((key.parse::<i64>().ok()?, value)))
            .collect();
        // select=-1 is the newest build.
        entries.sort_by_key(|(index, _)| -index);
        Ok(entries
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_value(value).ok())
            .collect())
    }
}
