use std::fmt;
use std::str::FromStr;

use crate::crypto::secrets_match;
use crate::domain::{ListId, MemberReceipt, UserId};
use crate::sync::{
    SubscribeOptions, SubscriptionEngine, SyncError, SyncOutcome, SyncResult, UnsubscribeOptions,
    Unsubscribed,
};

/// Host user lifecycle actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Add,
    Update,
    Delete,
}

impl FromStr for UserAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("{} is not a user action", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookKind {
    Unsubscribe,
    Other(String),
}

impl From<&str> for WebhookKind {
    fn from(kind: &str) -> Self {
        match kind {
            "unsubscribe" => Self::Unsubscribe,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsubscribe => f.write_str("unsubscribe"),
            Self::Other(kind) => f.write_str(kind),
        }
    }
}

/// A callback delivered by the remote service
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub kind: WebhookKind,
    /// Untrusted list id, sanitized before use
    pub list_id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Unsubscribed(SyncOutcome<Unsubscribed>),
    /// No host user has the event's address
    UnknownUser,
    /// The event type is received but not acted on
    Ignored(WebhookKind),
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook secret does not match list {0}")]
    SecretMismatch(ListId),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Turns host lifecycle events and remote callbacks into engine calls
#[derive(Debug, Clone)]
pub struct EventBridge {
    engine: SubscriptionEngine,
}

impl EventBridge {
    pub fn new(engine: SubscriptionEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SubscriptionEngine {
        &self.engine
    }

    /// Added and updated users are resubscribed to exactly the merged lists
    /// they are subscribed to, refreshing their merge vars. Deleted users are
    /// unsubscribed from every merged list.
    #[tracing::instrument(name = "User changed", skip(self))]
    pub async fn user_changed(&self, user_id: UserId, action: UserAction) -> SyncResult<()> {
        match action {
            UserAction::Add | UserAction::Update => {
                let user = self.engine.resolve_user(user_id.into()).await?;

                let mut subscribed = Vec::new();
                for list_id in self.engine.lists().merged().await?.into_keys() {
                    match self.engine.context().subscription(&user, &list_id).await {
                        Ok(Some(_)) => subscribed.push(list_id),
                        Ok(None) => {}
                        Err(e) => tracing::warn!(
                            user_id,
                            list_id = %list_id,
                            "Membership unknown, not refreshing: {}",
                            e
                        ),
                    }
                }

                if subscribed.is_empty() {
                    tracing::debug!(user_id, "User has no subscriptions to refresh");
                    return Ok(());
                }

                self.engine
                    .subscribe_all(user, Some(subscribed), SubscribeOptions::default())
                    .await?;
            }
            UserAction::Delete => {
                self.engine
                    .unsubscribe_all(user_id, None, UnsubscribeOptions::default())
                    .await?;
            }
        }

        Ok(())
    }

    /// Follow the host's do-not-email flag: set unsubscribes from every
    /// merged list, cleared subscribes to every merged list
    #[tracing::instrument(name = "Do-not-email updated", skip(self))]
    pub async fn do_not_email_updated(&self, user_id: UserId, do_not_email: bool) -> SyncResult<()> {
        if user_id <= 0 {
            tracing::debug!(user_id, "Ignoring do-not-email change for invalid user id");
            return Ok(());
        }

        if do_not_email {
            self.engine
                .unsubscribe_all(user_id, None, UnsubscribeOptions::default())
                .await?;
        } else {
            self.engine
                .subscribe_all(user_id, None, SubscribeOptions::default())
                .await?;
        }

        Ok(())
    }

    /// Runs ahead of the host storing a new address, while the remote
    /// members can still be found under the old one
    pub async fn before_email_change(
        &self,
        user_id: UserId,
        new_email: &str,
    ) -> SyncResult<Vec<(ListId, MemberReceipt)>> {
        self.engine.update_email(user_id, new_email).await
    }

    /// Verify the list's shared secret, then act on the event. Only
    /// unsubscribes are handled; other event types are acknowledged and
    /// ignored.
    #[tracing::instrument(name = "Handle webhook", skip(self, event, secret), fields(kind = %event.kind))]
    pub async fn handle_webhook(
        &self,
        event: WebhookEvent,
        secret: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let list_id = ListId::sanitized(&event.list_id);

        let authorized = match (secret, self.engine.context().catalog.webhook_secret(&list_id)) {
            (Some(provided), Some(expected)) => secrets_match(provided, expected),
            _ => false,
        };
        if !authorized {
            tracing::warn!(list_id = %list_id, "Rejected webhook with a bad secret");
            return Err(WebhookError::SecretMismatch(list_id));
        }

        match event.kind {
            WebhookKind::Unsubscribe => {
                let email = event.email.as_deref().map(str::trim).unwrap_or_default();
                if email.is_empty() {
                    return Ok(WebhookOutcome::UnknownUser);
                }

                let Some(user) = self.engine.context().users.find_by_email(email).await.map_err(SyncError::from)? else {
                    tracing::debug!(list_id = %list_id, "No user for webhook address");
                    return Ok(WebhookOutcome::UnknownUser);
                };

                let outcome = self
                    .engine
                    .unsubscribe(user, &list_id, UnsubscribeOptions::default())
                    .await?;

                Ok(WebhookOutcome::Unsubscribed(outcome))
            }
            kind => {
                tracing::debug!(kind = %kind, "Ignoring webhook event");
                Ok(WebhookOutcome::Ignored(kind))
            }
        }
    }
}
