use config::{Config, ConfigError, Environment, File, FileFormat};
use serde_derive::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct AutolandConfig {
    /// Destination repository coordinates.
    pub owner: String,
    pub repo: String,

    /// Authors whose comments may carry verdicts. May be replaced at run
    /// time by the repository collaborators.
    #[serde(default)]
    pub reviewers: Vec<String>,

    #[serde(default = "default_approval_tokens")]
    pub approval_tokens: Vec<String>,

    #[serde(default = "default_disapproval_tokens")]
    pub disapproval_tokens: Vec<String>,

    #[serde(default)]
    pub ignored_users_in_comments: Vec<String>,

    /// Buildbot backend: builder names, base URL, build history depth.
    #[serde(default)]
    pub builders: Vec<String>,
    pub buildbot: Option<String>,
    #[serde(default = "default_nbuilds")]
    pub nbuilds: u32,

    #[serde(default)]
    pub use_github_commit_status_api: bool,
    #[serde(default)]
    pub use_github_checks_api: bool,

    /// Global integration branch. When absent, one is derived per pull
    /// request and deleted after landing.
    pub test_ref: Option<String>,

    pub gh_user: String,
    pub gh_pass: Option<String>,
    pub gh_token: Option<String>,
    #[serde(default = "default_gh_api")]
    pub gh_api: String,
    #[serde(default = "default_gh_host")]
    pub gh_host: String,

    #[serde(default)]
    pub collaborators_as_reviewers: bool,

    /// Require an explicit "@<bot>: merge" comment before landing.
    #[serde(default)]
    pub no_auto_merge: bool,

    #[serde(default)]
    pub delete_source_branch: bool,

    pub max_pulls_per_run: Option<usize>,
}

fn default_approval_tokens() -> Vec<String> {
    vec!["r+".into(), "r=me".into()]
}

fn default_disapproval_tokens() -> Vec<String> {
    vec!["r-".into()]
}

fn default_nbuilds() -> u32 {
    5
}

fn default_gh_api() -> String {
    "https://api.github.com".into()
}

fn default_gh_host() -> String {
    "github.com".into()
}

impl AutolandConfig {
    pub fn new(config_file_path: &str) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        let config_file_path = shellexpand::tilde(config_file_path);
        config.merge(File::new(&config_file_path, FileFormat::Json).required(true))?;
        // Flat key space, so no separator: AUTOLAND_GH_TOKEN -> gh_token.
        config.merge(Environment::with_prefix("autoland"))?;
        config.try_into()
    }

    /// Returns the credential sent as the basic-auth password. The platform
    /// accepts a personal access token in place of a password.
    pub fn password(&self) -> Option<&str> {
        self.gh_pass.as_deref().or(self.gh_token.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AutolandConfig {
        serde_json::from_str(
            r#"{
                "owner": "acme",
                "repo": "widgets",
                "gh_user": "autoland"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn default_tokens() {
        let config = minimal();
        assert_eq!(config.approval_tokens, vec!["r+", "r=me"]);
        assert_eq!(config.disapproval_tokens, vec!["r-"]);
        assert_eq!(config.nbuilds, 5);
        assert_eq!(config.gh_api, "https://api.github.com");
        assert_eq!(config.gh_host, "github.com");
        assert!(!config.no_auto_merge);
        assert!(config.test_ref.is_none());
        assert!(config.max_pulls_per_run.is_none());
    }

    #[test]
    fn token_stands_in_for_password() {
        let mut config = minimal();
        assert_eq!(config.password(), None);
        config.gh_token = Some("t0k3n".into());
        assert_eq!(config.password(), Some("t0k3n"));
        config.gh_pass = Some("hunter2".into());
        assert_eq!(config.password(), Some("hunter2"));
    }
}
