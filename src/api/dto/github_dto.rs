//! GitHub webhook payload, restricted to the fields the translator reads.
//!
//! Every field defaults so that any event kind deserializes; the
//! translator decides which fields are meaningful for which kind.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Top-level webhook body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GithubWebhook {
    /// Event action (`created`, `deleted`, `opened`, `closed`, ...).
    pub action: String,
    /// Pushed ref (`refs/heads/main`).
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Base ref of a push.
    pub base_ref: Option<String>,
    /// Commits included in a push.
    pub commits: Vec<GithubCommit>,
    /// Repository the event happened in.
    pub repository: GithubRepository,
    /// Account that triggered the event.
    pub sender: GithubUser,
    /// Pusher of a push event.
    pub pusher: GithubPusher,
    /// Issue for `issues` and `issue_comment` events.
    pub issue: Option<GithubIssue>,
    /// Pull request for `pull_request*` events.
    pub pull_request: Option<GithubPullRequest>,
    /// Comment for `*_comment` events.
    pub comment: Option<GithubComment>,
}

/// A pushed commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GithubCommit {
    /// Full commit SHA.
    pub id: String,
    /// Commit message.
    pub message: String,
    /// Web URL of the commit.
    pub url: String,
    /// Commit author.
    pub author: GithubCommitAuthor,
}

/// Author block inside a commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GithubCommitAuthor {
    /// Display name.
    pub name: String,
    /// GitHub username, if the author is linked to an account.
    pub username: String,
}

/// Repository summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GithubRepository {
    /// `owner/name`.
    pub full_name: String,
    /// Web URL.
    pub html_url: String,
}

/// Account summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GithubUser {
    /// Login name.
    pub login: String,
    /// Avatar image URL.
    pub avatar_url: String,
    /// Profile URL.
    pub html_url: String,
}

/// Pusher block of a push event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GithubPusher {
    /// Pusher name.
    pub name: String,
}

/// Issue summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GithubIssue {
    /// Issue number.
    pub number: u64,
    /// Title.
    pub title: String,
    /// Markdown body, may be absent.
    pub body: Option<String>,
    /// Web URL.
    pub html_url: String,
}

/// Pull request summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GithubPullRequest {
    /// PR number.
    pub number: u64,
    /// Title.
    pub title: String,
    /// Markdown body, may be absent.
    pub body: Option<String>,
    /// Web URL.
    pub html_url: String,
    /// Target branch.
    pub base: GithubBranch,
    /// Source branch.
    pub head: GithubBranch,
}

/// Branch endpoint of a pull request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GithubBranch {
    /// Branch name.
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// `owner:branch` label.
    pub label: String,
}

/// Issue or review comment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GithubComment {
    /// Markdown body.
    pub body: Option<String>,
    /// Web URL.
    pub html_url: String,
}
