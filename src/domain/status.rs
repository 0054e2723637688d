use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};

use serde::{Deserialize, Serialize};

use crate::domain::{ListId, MemberInfo};

/// The last mutating action performed for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Subscribe,
    Unsubscribe,
    Update,
}

impl SyncAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a user's synchronization state, overwritten on every sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberStatus {
    /// Last sync timestamp
    pub activity_date: DateTime<Utc>,
    pub last_action_performed: SyncAction,
    /// Operation that wrote this snapshot
    pub source_function: String,
    #[serde(default)]
    pub subscriptions: BTreeSet<ListId>,
    #[serde(default)]
    pub unsubscribed: BTreeSet<ListId>,
}

impl SubscriberStatus {
    /// Build a snapshot from per-list "is subscribed" answers.
    /// Each list lands in exactly one of the two sets.
    pub fn new(
        action: SyncAction,
        source_function: &str,
        memberships: impl IntoIterator<Item = (ListId, bool)>,
    ) -> Self {
        let (subscriptions, unsubscribed): (Vec<_>, Vec<_>) =
            memberships.into_iter().partition(|(_, subscribed)| *subscribed);

        Self {
            activity_date: Utc::now(),
            last_action_performed: action,
            source_function: source_function.to_string(),
            subscriptions: subscriptions.into_iter().map(|(id, _)| id).collect(),
            unsubscribed: unsubscribed.into_iter().map(|(id, _)| id).collect(),
        }
    }

    /// No list may be both subscribed and unsubscribed
    pub fn is_consistent(&self) -> bool {
        self.subscriptions.is_disjoint(&self.unsubscribed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Remote metadata cached for one list membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListMemberInfo {
    pub web_id: Option<u64>,
    /// Engagement score, 0 to 5
    pub member_rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoPoint>,
}

impl From<&MemberInfo> for ListMemberInfo {
    fn from(member: &MemberInfo) -> Self {
        Self {
            web_id: member.web_id,
            member_rating: member.member_rating.unwrap_or(0).min(5),
            geo: member.geo.map(|geo| GeoPoint {
                lat: geo.latitude,
                lon: geo.longitude,
            }),
        }
    }
}

/// Per-list remote metadata for a user, keyed by list id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteInfo(BTreeMap<ListId, ListMemberInfo>);

impl RemoteInfo {
    pub fn get(&self, list_id: &ListId) -> Option<&ListMemberInfo> {
        self.0.get(list_id)
    }

    pub fn insert(&mut self, list_id: ListId, info: ListMemberInfo) {
        self.0.insert(list_id, info);
    }

    pub fn remove(&mut self, list_id: &ListId) -> Option<ListMemberInfo> {
        self.0.remove(list_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ListId, &ListMemberInfo)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first non-zero member rating across lists
    pub fn member_rating(&self) -> Option<u8> {
        self.0
            .values()
            .map(|info| info.member_rating)
            .find(|rating| *rating > 0)
    }
}
