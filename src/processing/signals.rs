use chrono::{DateTime, Utc};
use regex::Regex;

/// A comment reduced to the fields the state machine reads.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentData {
    pub created_at: DateTime<Utc>,
    pub author: String,
    pub body: String,
}

impl CommentData {
    pub fn new<A: Into<String>, B: Into<String>>(
        created_at: DateTime<Utc>,
        author: A,
        body: B,
    ) -> Self {
        Self {
            created_at,
            author: author.into(),
            body: body.into(),
        }
    }
}

lazy_static! {
    static ref PRIORITY: Regex = Regex::new(r"\bp=(-?\d+)\b").unwrap();
    static ref DELEGATE: Regex = Regex::new(r"^r=(\w+)").unwrap();
}

/// Recognizes review verdicts and bot commands in comment bodies. Compiled
/// once per configuration from the verdict token lists and the bot login.
pub struct SignalMatcher {
    approval: Regex,
    disapproval: Regex,
    thread_approval: Regex,
    thread_disapproval: Regex,
    retry_prefix: String,
    merge_prefix: String,
}

impl SignalMatcher {
    pub fn new(bot: &str, approval_tokens: &[String], disapproval_tokens: &[String]) -> Self {
        Self {
            approval: prefix_matcher(approval_tokens),
            disapproval: prefix_matcher(disapproval_tokens),
            thread_approval: sha_bound_matcher(approval_tokens),
            thread_disapproval: sha_bound_matcher(disapproval_tokens),
            retry_prefix: format!("@{}: retry", bot),
            merge_prefix: format!("@{}: merge", bot),
        }
    }

    /// Approvers from head comments (token prefix, plus `r=<name>`
    /// delegation) and from pull-thread comments whose SHA prefix pins the
    /// current head. Head comments must already be reviewer-filtered;
    /// thread comments must be reviewer-only too.
    pub fn approvers(
        &self,
        head_comments: &[CommentData],
        thread_comments: &[CommentData],
        head_sha: &str,
    ) -> Vec<String> {
        let mut authors = Vec::new();
        for comment in head_comments {
            if self.approval.is_match(&comment.body) {
                authors.push(comment.author.clone());
            }
        }
        for comment in head_comments {
            if let Some(captures) = DELEGATE.captures(&comment.body) {
                authors.push(captures[1].to_string());
            }
        }
        authors.extend(self.thread_verdicts(&self.thread_approval, thread_comments, head_sha));
        dedup(authors)
    }

    pub fn disapprovers(
        &self,
        head_comments: &[CommentData],
        thread_comments: &[CommentData],
        head_sha: &str,
    ) -> Vec<String> {
        let mut authors: Vec<_> = head_comments
            .iter()
            .filter(|comment| self.disapproval.is_match(&comment.body))
            .map(|comment| comment.author.clone())
            .collect();
        authors.extend(self.thread_verdicts(&self.thread_disapproval, thread_comments, head_sha));
        dedup(authors)
    }

    /// A verdict given on the pull thread only counts when its SHA prefix
    /// matches the revision under review.
    fn thread_verdicts(
        &self,
        matcher: &Regex,
        comments: &[CommentData],
        head_sha: &str,
    ) -> Vec<String> {
        comments
            .iter()
            .filter_map(|comment| {
                let captures = matcher.captures(&comment.body)?;
                let prefix = captures[1].to_ascii_lowercase();
                head_sha.starts_with(&prefix).then(|| comment.author.clone())
            })
            .collect()
    }

    pub fn retries(&self, head_comments: &[CommentData]) -> usize {
        head_comments
            .iter()
            .filter(|comment| comment.body.starts_with(&self.retry_prefix))
            .count()
    }

    pub fn merge_requested(&self, head_comments: &[CommentData]) -> bool {
        head_comments
            .iter()
            .any(|comment| comment.body.starts_with(&self.merge_prefix))
    }

    pub fn priority(head_comments: &[CommentData]) -> i64 {
        head_comments
            .iter()
            .flat_map(|comment| PRIORITY.captures_iter(&comment.body))
            .filter_map(|captures| captures[1].parse().ok())
            .max()
            .unwrap_or(0)
    }
}

fn prefix_matcher(tokens: &[String]) -> Regex {
    Regex::new(&format!("^(?:{})", alternation(tokens))).unwrap()
}

fn sha_bound_matcher(tokens: &[String]) -> Regex {
    Regex::new(&format!(
        r"^(?:{})[ \t]+([0-9a-fA-F]{{4,40}})\b",
        alternation(tokens)
    ))
    .unwrap()
}

fn alternation(tokens: &[String]) -> String {
    if tokens.is_empty() {
        // A never-matching branch; an empty alternation matches everything.
        return "$^".into();
    }
    let escaped: Vec<_> = tokens.iter().map(|token| regex::escape(token)).collect();
    escaped.join("|")
}

fn dedup(authors: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    authors
        .into_iter()
        .filter(|author| seen.insert(author.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn comment(author: &str, body: &str) -> CommentData {
        CommentData::new(
            Utc.with_ymd_and_hms(2013, 2, 1, 10, 0, 0).unwrap(),
            author,
            body,
        )
    }

    fn matcher() -> SignalMatcher {
        SignalMatcher::new(
            "autoland",
            &["r+".to_string(), "r=me".to_string()],
            &["r-".to_string()],
        )
    }

    #[rstest]
    #[case::plain("r+", true)]
    #[case::with_sha("r+ abc1234", true)]
    #[case::self_review("r=me", true)]
    #[case::negative("r-", false)]
    #[case::chatter("looks good", false)]
    #[case::mid_comment("I say r+", false)]
    fn head_approval_recognition(#[case] body: &str, #[case] approved: bool) {
        let approvers = matcher().approvers(&[comment("alice", body)], &[], "abc1234def");
        assert_eq!(approvers.contains(&"alice".to_string()), approved);
    }

    #[test]
    fn delegation_nominates_approver() {
        let approvers = matcher().approvers(&[comment("alice", "r=bob abc1234")], &[], "abc1234def");
        assert_eq!(approvers, vec!["bob"]);
    }

    #[test]
    fn self_review_keeps_both_author_and_nominee() {
        let approvers = matcher().approvers(&[comment("alice", "r=me")], &[], "abc1234def");
        assert_eq!(approvers, vec!["alice", "me"]);
    }

    #[test]
    fn duplicate_approvals_collapse() {
        let comments = [comment("alice", "r+"), comment("alice", "r+ again")];
        assert_eq!(matcher().approvers(&comments, &[], "abc1234def"), vec!["alice"]);
    }

    #[rstest]
    #[case::exact_prefix("r+ abc1234", true)]
    #[case::short_prefix("r+ abc1", true)]
    #[case::upper_case("r+ ABC1234", true)]
    #[case::wrong_sha("r+ def5678", false)]
    #[case::no_sha("r+", false)]
    fn thread_approval_requires_matching_prefix(#[case] body: &str, #[case] approved: bool) {
        let approvers = matcher().approvers(&[], &[comment("alice", body)], "abc1234def");
        assert_eq!(approvers.contains(&"alice".to_string()), approved);
    }

    #[test]
    fn disapproval_recognition() {
        let head = [comment("alice", "r- needs work")];
        let thread = [comment("bob", "r- abc1")];
        let disapprovers = matcher().disapprovers(&head, &thread, "abc1234def");
        assert_eq!(disapprovers, vec!["alice", "bob"]);
    }

    #[test]
    fn retry_and_merge_commands() {
        let comments = [
            comment("alice", "@autoland: retry"),
            comment("alice", "@autoland: retry please"),
            comment("bob", "@autoland: merge"),
            comment("carol", "retry"),
        ];
        let matcher = matcher();
        assert_eq!(matcher.retries(&comments), 2);
        assert!(matcher.merge_requested(&comments));
    }

    #[rstest]
    #[case::none(&["just words"], 0)]
    #[case::single(&["p=5"], 5)]
    #[case::negative(&["p=-3"], -3)]
    #[case::max_wins(&["p=1", "p=7 urgent", "p=2"], 7)]
    #[case::embedded(&["bump p=12 for release"], 12)]
    fn priority_is_max_of_tokens(#[case] bodies: &[&str], #[case] expected: i64) {
        let comments: Vec<_> = bodies.iter().map(|body| comment("alice", body)).collect();
        assert_eq!(SignalMatcher::priority(&comments), expected);
    }

    #[test]
    fn custom_tokens_are_escaped() {
        let matcher = SignalMatcher::new(
            "autoland",
            &["lgtm++".to_string()],
            &["veto().".to_string()],
        );
        let approvers = matcher.approvers(&[comment("alice", "lgtm++")], &[], "abc1234def");
        assert_eq!(approvers, vec!["alice"]);
        // The literal dot must not act as a wildcard.
        let disapprovers = matcher.disapprovers(&[comment("bob", "veto()x")], &[], "abc1234def");
        assert!(disapprovers.is_empty());
    }

    #[test]
    fn empty_token_list_never_matches() {
        let matcher = SignalMatcher::new("autoland", &[], &[]);
        assert!(matcher
            .approvers(&[comment("alice", "r+")], &[], "abc1234def")
            .is_empty());
    }
}
