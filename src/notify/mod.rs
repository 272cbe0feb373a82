//! Inbound webhook translation and outbound notification delivery.

pub mod github;
pub mod sink;

pub use github::{GithubEventKind, Notification, NotificationAuthor, NotificationField, translate};
pub use sink::{HubNotificationSink, NotificationSink};
