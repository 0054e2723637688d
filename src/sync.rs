//! Subscription synchronization between host users and remote lists.
//!
//! [`SyncContext`] bundles the collaborators. [`SubscriptionEngine`] performs
//! the per-list mutations and [`EventBridge`] translates host and webhook
//! events into engine calls.

mod context;
mod engine;
mod error;
mod events;
mod lists;
mod membership;
mod worker;

pub use context::{ListCatalog, SyncContext, SyncContextBuilder};
pub use engine::{
    Profile, SubscribeOptions, SubscriptionEngine, SyncOutcome, UnsubscribeOptions, Unsubscribed,
    UpdateOutcome,
};
pub use error::{SyncError, SyncResult};
pub use events::{EventBridge, UserAction, WebhookError, WebhookEvent, WebhookKind, WebhookOutcome};
pub use lists::{ListResolver, ListSource};
pub use worker::run_worker;
