//! GitHub webhook translation.
//!
//! Each supported `X-GitHub-Event` kind maps to a pure formatting function
//! that turns the payload into a [`Notification`]. Unknown kinds fall back
//! to a summary line plus the raw payload.

use std::fmt;

use serde::Serialize;
use utoipa::ToSchema;

use crate::api::dto::{GithubUser, GithubWebhook};

/// Header carrying the event kind.
pub const EVENT_HEADER: &str = "x-github-event";

/// Embed color for additive actions.
pub const COLOR_POSITIVE: u32 = 0x00ff1a;

/// Embed color for destructive actions.
pub const COLOR_NEGATIVE: u32 = 0xff0000;

/// Issue and pull request bodies are cut to this many characters.
pub const BODY_LIMIT: usize = 1000;

/// Body shown when the issue or pull request has none.
pub const NO_DESCRIPTION: &str = "No description available";

/// Event kinds with a dedicated formatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GithubEventKind {
    /// Commits pushed to a branch.
    Push,
    /// Repository starred or unstarred.
    Star,
    /// Issue opened, edited, closed and so on.
    Issues,
    /// Pull request activity.
    PullRequest,
    /// Comment on an issue or pull request conversation.
    IssueComment,
    /// Review comment on a pull request diff.
    PullRequestReviewComment,
    /// Anything else; carries the raw header value.
    Other(String),
}

impl GithubEventKind {
    /// Parses the `X-GitHub-Event` header value.
    #[must_use]
    pub fn from_header(value: &str) -> Self {
        match value.trim() {
            "push" => Self::Push,
            "star" => Self::Star,
            "issues" => Self::Issues,
            "pull_request" => Self::PullRequest,
            "issue_comment" => Self::IssueComment,
            "pull_request_review_comment" => Self::PullRequestReviewComment,
            other => Self::Other(other.to_string()),
        }
    }

    /// Header spelling of the kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Push => "push",
            Self::Star => "star",
            Self::Issues => "issues",
            Self::PullRequest => "pull_request",
            Self::IssueComment => "issue_comment",
            Self::PullRequestReviewComment => "pull_request_review_comment",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for GithubEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author line of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct NotificationAuthor {
    /// Display name.
    pub name: String,
    /// Avatar URL.
    pub icon_url: String,
}

/// One name/value row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct NotificationField {
    /// Row label.
    pub name: String,
    /// Row value (markdown).
    pub value: String,
}

impl NotificationField {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// Formatted, transport-neutral notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct Notification {
    /// Headline.
    pub title: String,
    /// Embed color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    /// Link target of the title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Who triggered the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<NotificationAuthor>,
    /// Detail rows.
    pub fields: Vec<NotificationField>,
    /// Free-form text, used by the fallback formatter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Raw payload attached by the fallback formatter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

type Formatter = fn(&GithubWebhook) -> Notification;

/// Formats `hook` according to `kind`.
#[must_use]
pub fn translate(kind: &GithubEventKind, hook: &GithubWebhook) -> Notification {
    let format: Formatter = match kind {
        GithubEventKind::Push => format_push,
        GithubEventKind::Star => format_star,
        GithubEventKind::Issues => format_issue,
        GithubEventKind::PullRequest => format_pull_request,
        GithubEventKind::IssueComment => format_issue_comment,
        GithubEventKind::PullRequestReviewComment => format_review_comment,
        GithubEventKind::Other(name) => return format_other(name, hook),
    };
    format(hook)
}

/// Cuts to [`BODY_LIMIT`] characters; empty or missing becomes
/// [`NO_DESCRIPTION`].
#[must_use]
pub fn summarize_body(body: Option<&str>) -> String {
    match body {
        Some(text) if !text.is_empty() => text.chars().take(BODY_LIMIT).collect(),
        _ => NO_DESCRIPTION.to_string(),
    }
}

fn author(sender: &GithubUser) -> Option<NotificationAuthor> {
    Some(NotificationAuthor {
        name: sender.login.clone(),
        icon_url: sender.avatar_url.clone(),
    })
}

fn user_link(sender: &GithubUser) -> String {
    format!("[{}]({})", sender.login, sender.html_url)
}

fn profile_link(name: &str) -> String {
    format!("[{name}](https://github.com/{name})")
}

const fn color(negative: bool) -> Option<u32> {
    if negative {
        Some(COLOR_NEGATIVE)
    } else {
        Some(COLOR_POSITIVE)
    }
}

fn format_push(hook: &GithubWebhook) -> Notification {
    let commits: String = hook
        .commits
        .iter()
        .map(|commit| {
            let short = commit.id.get(..7).unwrap_or(&commit.id);
            format!(
                "{} [{short}]({}) | {}\n",
                commit.message,
                commit.url,
                profile_link(&commit.author.username)
            )
        })
        .collect();
    let branch = format!(
        "**Ref:** {}\n**Base Ref:** {}",
        hook.git_ref,
        hook.base_ref.as_deref().unwrap_or_default()
    );

    Notification {
        title: format!("Push on {}", hook.repository.full_name),
        color: color(false),
        url: Some(hook.repository.html_url.clone()),
        author: author(&hook.sender),
        fields: vec![
            NotificationField::new("Branch", branch),
            NotificationField::new("Commits", commits),
            NotificationField::new("Pusher", profile_link(&hook.pusher.name)),
        ],
        ..Notification::default()
    }
}

fn format_star(hook: &GithubWebhook) -> Notification {
    let starred = hook.action == "created";
    let verb = if starred { "Starred" } else { "Unstarred" };
    Notification {
        title: format!("{verb}: {}", hook.repository.full_name),
        color: color(!starred),
        url: Some(hook.repository.html_url.clone()),
        fields: vec![NotificationField::new("User", user_link(&hook.sender))],
        ..Notification::default()
    }
}

fn format_issue(hook: &GithubWebhook) -> Notification {
    let issue = hook.issue.clone().unwrap_or_default();
    Notification {
        title: format!(
            "Issue {} on {} (#{})",
            hook.action, hook.repository.full_name, issue.number
        ),
        color: color(matches!(hook.action.as_str(), "deleted" | "unpinned")),
        url: Some(issue.html_url),
        author: author(&hook.sender),
        fields: vec![
            NotificationField::new("Action", hook.action.as_str()),
            NotificationField::new("User", user_link(&hook.sender)),
            NotificationField::new("Title", issue.title),
            NotificationField::new("Body", summarize_body(issue.body.as_deref())),
        ],
        ..Notification::default()
    }
}

fn format_pull_request(hook: &GithubWebhook) -> Notification {
    let pr = hook.pull_request.clone().unwrap_or_default();
    let refs = format!(
        "**Base Ref:** {}\n**Base Label:** {}\n**Head Ref:** {}\n**Head Label:** {}",
        pr.base.git_ref, pr.base.label, pr.head.git_ref, pr.head.label
    );
    Notification {
        title: format!(
            "Pull Request {} on {} (#{})",
            hook.action, hook.repository.full_name, pr.number
        ),
        color: color(hook.action == "closed"),
        url: Some(pr.html_url),
        author: author(&hook.sender),
        fields: vec![
            NotificationField::new("Action", hook.action.as_str()),
            NotificationField::new("User", user_link(&hook.sender)),
            NotificationField::new("Title", pr.title),
            NotificationField::new("Body", summarize_body(pr.body.as_deref())),
            NotificationField::new("More Information", refs),
        ],
        ..Notification::default()
    }
}

fn format_issue_comment(hook: &GithubWebhook) -> Notification {
    let issue = hook.issue.clone().unwrap_or_default();
    let body = hook
        .comment
        .as_ref()
        .and_then(|c| c.body.as_deref())
        .or(issue.body.as_deref());
    Notification {
        title: format!(
            "Comment on {} (#{}) {}",
            hook.repository.full_name, issue.number, hook.action
        ),
        color: color(hook.action == "deleted"),
        url: Some(issue.html_url.clone()),
        author: author(&hook.sender),
        fields: vec![
            NotificationField::new("User", user_link(&hook.sender)),
            NotificationField::new("Title", issue.title.as_str()),
            NotificationField::new("Body", summarize_body(body)),
        ],
        ..Notification::default()
    }
}

fn format_review_comment(hook: &GithubWebhook) -> Notification {
    let pr = hook.pull_request.clone().unwrap_or_default();
    let body = hook
        .comment
        .as_ref()
        .and_then(|c| c.body.as_deref())
        .or(pr.body.as_deref());
    Notification {
        title: format!(
            "Pull Request Review Comment on {} (#{})",
            hook.repository.full_name, pr.number
        ),
        color: color(hook.action == "deleted"),
        url: Some(pr.html_url.clone()),
        author: author(&hook.sender),
        fields: vec![
            NotificationField::new("User", user_link(&hook.sender)),
            NotificationField::new("Title", pr.title.as_str()),
            NotificationField::new("Body", summarize_body(body)),
        ],
        ..Notification::default()
    }
}

fn format_other(name: &str, hook: &GithubWebhook) -> Notification {
    Notification {
        title: format!("GitHub event: {name}"),
        content: Some(format!("**Action: {name}**")),
        attachment: serde_json::to_string_pretty(hook).ok(),
        ..Notification::default()
    }
}
