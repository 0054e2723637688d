//! Contract with the remote email-marketing service.

mod mailchimp;

pub use mailchimp::{MailchimpClient, MAX_ACTIVITY_EMAILS};

use async_trait::async_trait;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{ListId, ListInfo, MemberInfo, MemberReceipt, MergeVars};

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failures of a single remote call
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Failed to reach the email service: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Email service error {code} ({name}): {message}")]
    Api {
        code: i64,
        name: String,
        message: String,
    },
    #[error("Unexpected response from the email service: {0}")]
    Protocol(String),
    #[error("Email service did not complete the request: {0}")]
    Rejected(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// A merge field defined on a remote list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeField {
    pub tag: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub req: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortDir {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

/// Campaign listing parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignQuery {
    pub filters: Map<String, Value>,
    #[serde(rename = "start")]
    pub offset: u32,
    pub limit: u32,
    pub sort_field: String,
    pub sort_dir: SortDir,
}

impl Default for CampaignQuery {
    fn default() -> Self {
        Self {
            filters: Map::new(),
            offset: 0,
            limit: 25,
            sort_field: "create_time".into(),
            sort_dir: SortDir::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignInfo {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPage {
    pub total: u64,
    pub data: Vec<CampaignInfo>,
}

/// Open and click history of one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub email: Value,
    #[serde(default)]
    pub activity: Vec<Value>,
}

/// The remote service operations synchronization depends on.
///
/// Every method reports failures as a [`RemoteError`]; implementations never
/// panic on malformed responses.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn enumerate_lists(&self) -> RemoteResult<Vec<ListInfo>>;

    async fn merge_fields(&self, list_id: &ListId) -> RemoteResult<Vec<MergeField>>;

    /// `None` when the address has no record on the list
    async fn lookup_member(&self, list_id: &ListId, email: &str)
        -> RemoteResult<Option<MemberInfo>>;

    async fn subscribe_member(
        &self,
        list_id: &ListId,
        email: &str,
        merge_vars: &MergeVars,
    ) -> RemoteResult<MemberReceipt>;

    /// `delete` purges the member record instead of marking it unsubscribed
    async fn unsubscribe_member(&self, list_id: &ListId, email: &str, delete: bool)
        -> RemoteResult<()>;

    /// Update the member currently known as `email`
    async fn update_member(
        &self,
        list_id: &ListId,
        email: &str,
        merge_vars: &MergeVars,
    ) -> RemoteResult<MemberReceipt>;

    async fn list_campaigns(&self, query: &CampaignQuery) -> RemoteResult<CampaignPage>;

    async fn delete_campaign(&self, campaign_id: &str) -> RemoteResult<()>;

    async fn member_activity(
        &self,
        list_id: &ListId,
        emails: &[String],
    ) -> RemoteResult<Vec<ActivityRecord>>;
}
