use autoland::ci::{Backend, BuildbotClient, DefaultCiAggregator};
use autoland::config::AutolandConfig;
use autoland::github::DefaultGithubClient;
use autoland::Director;
use env_logger::Env;
use log::{error, info};
use std::sync::Arc;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "autoland", about = "Automated merge integrator")]
struct Options {
    /// Suppress console logging
    #[structopt(long)]
    quiet: bool,

    /// Override the configured destination repository
    #[structopt(long)]
    repo: Option<String>,

    /// Path to the configuration file
    #[structopt(short, long, default_value = "autoland.cfg")]
    config: String,
}

fn build_backends(config: &AutolandConfig) -> Vec<Backend> {
    let mut backends = Vec::new();
    if let Some(url) = &config.buildbot {
        if !config.builders.is_empty() {
            backends.push(Backend::Buildbot(BuildbotClient::new(
                url.clone(),
                config.builders.clone(),
                config.nbuilds,
            )));
        }
    }
    if config.use_github_commit_status_api {
        backends.push(Backend::CommitStatuses);
    }
    if config.use_github_checks_api {
        backends.push(Backend::CheckRuns);
    }
    backends
}

#[tokio::main]
async fn main() {
    let options = Options::from_args();
    let default_level = if options.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let mut config = match AutolandConfig::new(&options.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(repo) = options.repo {
        config.repo = repo;
    }

    let github = Arc::new(DefaultGithubClient::new(
        config.gh_user.clone(),
        config.password().map(String::from),
        config.gh_api.clone(),
        config.owner.clone(),
        config.repo.clone(),
    ));
    let ci = Arc::new(DefaultCiAggregator::new(
        github.clone(),
        build_backends(&config),
    ));

    info!("---------- starting run ----------");
    let director = Director::new(github, ci, config, "autoland-status.js");
    match director.run().await {
        Ok(summary) => {
            info!(
                "run complete: {} open, {} viable, {} advanced",
                summary.open, summary.viable, summary.advanced
            );
        }
        Err(e) => {
            error!("Error processing pull requests: {}", e);
            std::process::exit(1);
        }
    }
}
