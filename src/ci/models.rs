use serde_derive::Deserialize;
use serde_json::Value;

// Buildbot numeric result codes.
const RESULT_SUCCESS: i64 = 0;
const RESULT_WARNINGS: i64 = 1;
const RESULT_FAILURE: i64 = 2;
const RESULT_SKIPPED: i64 = 3;
const RESULT_EXCEPTION: i64 = 4;
const RESULT_RETRY: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildResult {
    Success,
    Warnings,
    Failure,
    Skipped,
    Exception,
    Retry,
    Other,
}

/// One buildbot build, as returned by `json/builders/<name>/builds`.
/// Properties are heterogeneous `[name, value, source]` triples.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Build {
    pub number: u64,
    pub results: Option<i64>,
    #[serde(default)]
    pub properties: Vec<BuildProperty>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BuildProperty(pub String, pub Value, pub String);

impl Build {
    /// The revision this build checked out, taken from the `got_revision`
    /// property when it was set by a source step.
    pub fn revision(&self) -> Option<&str> {
        static SOURCES: [&str; 3] = ["Source", "Git", "SetProperty Step"];
        let mut revision = None;
        for BuildProperty(name, value, source) in &self.properties {
            if name == "got_revision" && SOURCES.contains(&source.as_str()) {
                revision = value.as_str();
            }
        }
        revision
    }

    pub fn result(&self) -> Option<BuildResult> {
        let result = match self.results? {
            RESULT_SUCCESS => BuildResult::Success,
            RESULT_WARNINGS => BuildResult::Warnings,
            RESULT_FAILURE => BuildResult::Failure,
            RESULT_SKIPPED => BuildResult::Skipped,
            RESULT_EXCEPTION => BuildResult::Exception,
            RESULT_RETRY => BuildResult::Retry,
            _ => BuildResult::Other,
        };
        Some(result)
    }
}

/// What one CI backend observed for a revision. URLs land in the bucket
/// matching their result; `incomplete` marks a backend that has not reported
/// everything it is expected to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendReport {
    pub passes: Vec<String>,
    pub warnings: Vec<String>,
    pub failures: Vec<String>,
    pub exceptions: Vec<String>,
    pub incomplete: bool,
}

/// The aggregate verdict for a revision: principal URLs are the
/// successes/failures, auxiliary URLs the warnings/exceptions.
#[derive(Debug, Clone, PartialEq)]
pub enum TestStatus {
    Pass {
        principal: Vec<String>,
        auxiliary: Vec<String>,
    },
    Fail {
        principal: Vec<String>,
        auxiliary: Vec<String>,
    },
    Waiting,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(raw: &str) -> Build {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn revision_from_properties() {
        let b = build(
            r#"{
                "number": 17,
                "results": 0,
                "properties": [
                    ["buildername", "auto-linux", "Build"],
                    ["got_revision", "abc1234", "Git"],
                    ["buildnumber", 17, "Build"]
                ]
            }"#,
        );
        assert_eq!(b.revision(), Some("abc1234"));
        assert_eq!(b.result(), Some(BuildResult::Success));
    }

    #[test]
    fn revision_requires_source_step() {
        let b = build(
            r#"{
                "number": 17,
                "results": 2,
                "properties": [["got_revision", "abc1234", "Scheduler"]]
            }"#,
        );
        assert_eq!(b.revision(), None);
        assert_eq!(b.result(), Some(BuildResult::Failure));
    }

    #[test]
    fn build_without_results_is_in_progress() {
        let b = build(
            r#"{
                "number": 18,
                "results": null,
                "properties": [["got_revision", "abc1234", "Source"]]
            }"#,
        );
        assert_eq!(b.result(), None);
    }

    #[test]
    fn result_code_mapping() {
        for (code, expected) in [
            (0, BuildResult::Success),
            (1, BuildResult::Warnings),
            (2, BuildResult::Failure),
            (3, BuildResult::Skipped),
            (4, BuildResult::Exception),
            (5, BuildResult::Retry),
            (9, BuildResult::Other),
        ] {
            let b = build(&format!(
                r#"{{"number": 1, "results": {}, "properties": []}}"#,
                code
            ));
            assert_eq!(b.result(), Some(expected));
        }
    }
}
