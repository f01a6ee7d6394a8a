use super::pull::{AdvanceOutcome, PullRequestModel, Settings, State};
use super::{snapshot, Error};
use crate::ci::CiAggregator;
use crate::config::AutolandConfig;
use crate::github::GithubClient;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

/// One full reconciliation pass: enumerate, rank, snapshot, advance.
pub struct Director<G, C> {
    github: Arc<G>,
    ci: Arc<C>,
    config: AutolandConfig,
    snapshot_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub open: usize,
    pub viable: usize,
    pub advanced: usize,
}

impl<G, C> Director<G, C>
where
    G: GithubClient + Send + Sync,
    C: CiAggregator + Send + Sync,
{
    pub fn new<P: Into<PathBuf>>(
        github: Arc<G>,
        ci: Arc<C>,
        config: AutolandConfig,
        snapshot_path: P,
    ) -> Self {
        Self {
            github,
            ci,
            config,
            snapshot_path: snapshot_path.into(),
        }
    }

    pub async fn run(&self) -> Result<RunSummary, Error> {
        let settings = Arc::new(self.build_settings().await?);

        let mut models = Vec::new();
        for pull in self.load_open_pulls().await? {
            let model = PullRequestModel::load(
                self.github.clone(),
                self.ci.clone(),
                settings.clone(),
                pull.number,
            )
            .await?;
            models.push(model);
        }
        // Ascending: the pull request closest to landing ends up last.
        models.sort_by_key(|model| model.sort_key());
        info!("got {} open pull reqs", models.len());

        snapshot::write(
            &self.snapshot_path,
            &self.config.owner,
            &self.config.repo,
            &models,
        )?;

        let viable: Vec<_> = models
            .iter()
            .filter(|model| {
                let state = model.current_state();
                state >= State::Discussing && state < State::Closed
            })
            .collect();
        info!("got {} viable pull reqs", viable.len());

        let skip = match self.config.max_pulls_per_run {
            Some(limit) => viable.len().saturating_sub(limit),
            None => 0,
        };
        let mut summary = RunSummary {
            open: models.len(),
            viable: viable.len(),
            advanced: 0,
        };
        for model in viable[skip..].iter().rev() {
            if model.advance().await? == AdvanceOutcome::Advanced {
                summary.advanced += 1;
            }
        }
        Ok(summary)
    }

    async fn build_settings(&self) -> Result<Settings, Error> {
        let reviewers = if self.config.collaborators_as_reviewers {
            info!("loading collaborators as reviewers");
            self.github
                .collaborators()
                .await?
                .into_iter()
                .map(|user| user.login)
                .collect()
        } else {
            self.config.reviewers.clone()
        };
        Ok(Settings::from_config(&self.config, reviewers))
    }

    async fn load_open_pulls(&self) -> Result<Vec<crate::github::PullRequestData>, Error> {
        let mut pulls = Vec::new();
        let mut page = 1;
        loop {
            info!("loading pull reqs (page {})", page);
            let batch = self.github.open_pulls(page).await?;
            if batch.is_empty() {
                break;
            }
            pulls.extend(batch);
            page += 1;
        }
        Ok(pulls)
    }
}
