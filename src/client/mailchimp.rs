use std::time::Duration;

use async_trait::async_trait;

use reqwest::Client;

use secrecy::Secret;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use url::Url;

use crate::client::{
    ActivityRecord, CampaignPage, CampaignQuery, MergeField, RemoteError, RemoteResult,
    RemoteService,
};
use crate::domain::{ListId, ListInfo, MemberInfo, MemberReceipt, MergeVars};

/// Most addresses the member-activity report accepts per call
pub const MAX_ACTIVITY_EMAILS: usize = 50;

const LIST_PAGE_LIMIT: u32 = 100;

/// JSON client for the MailChimp 2.0 API
#[derive(Debug)]
pub struct MailchimpClient {
    client: Client,
    api_base_url: Url,
    api_key: Secret<String>,
}

impl MailchimpClient {
    pub fn new(
        api_base_url: Url,
        api_key: Secret<String>,
        api_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(api_timeout).build()?;

        Ok(Self {
            client,
            api_base_url,
            api_key,
        })
    }

    /// POST `params` to `<base>/<method>.json` with the API key in the body
    async fn call<P, R>(&self, method: &str, params: P) -> RemoteResult<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        use secrecy::ExposeSecret;

        let url = self
            .api_base_url
            .join(&format!("{}.json", method))
            .map_err(|e| RemoteError::InvalidRequest(format!("{}: {}", method, e)))?;

        let body = ApiRequest {
            apikey: self.api_key.expose_secret(),
            params,
        };

        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<ApiErrorBody>(&bytes) {
                Ok(error) => RemoteError::Api {
                    code: error.code,
                    name: error.name,
                    message: error.error,
                },
                Err(_) => RemoteError::Protocol(format!("{} returned HTTP {}", method, status)),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| RemoteError::Protocol(format!("{}: {}", method, e)))
    }
}

#[async_trait]
impl RemoteService for MailchimpClient {
    #[tracing::instrument(name = "Enumerate remote lists", skip(self))]
    async fn enumerate_lists(&self) -> RemoteResult<Vec<ListInfo>> {
        let response: DataResponse<ListInfo> = self
            .call(
                "lists/list",
                ListsParams {
                    limit: LIST_PAGE_LIMIT,
                },
            )
            .await?;

        Ok(response.data)
    }

    #[tracing::instrument(name = "Fetch list merge fields", skip(self))]
    async fn merge_fields(&self, list_id: &ListId) -> RemoteResult<Vec<MergeField>> {
        let response: DataResponse<ListMergeVars> = self
            .call(
                "lists/merge-vars",
                MergeVarsParams {
                    id: [list_id.as_ref()],
                },
            )
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|list| list.merge_vars)
            .ok_or_else(|| RemoteError::Protocol(format!("No merge vars returned for list {}", list_id)))
    }

    #[tracing::instrument(name = "Fetch member info", skip(self))]
    async fn lookup_member(
        &self,
        list_id: &ListId,
        email: &str,
    ) -> RemoteResult<Option<MemberInfo>> {
        let response: DataResponse<MemberInfo> = self
            .call(
                "lists/member-info",
                MembersParams {
                    id: list_id.as_ref(),
                    emails: vec![EmailStruct { email }],
                },
            )
            .await?;

        Ok(response.data.into_iter().next())
    }

    #[tracing::instrument(name = "Subscribe member", skip(self, merge_vars))]
    async fn subscribe_member(
        &self,
        list_id: &ListId,
        email: &str,
        merge_vars: &MergeVars,
    ) -> RemoteResult<MemberReceipt> {
        self.call(
            "lists/subscribe",
            SubscribeParams {
                id: list_id.as_ref(),
                email: EmailStruct { email },
                merge_vars,
                email_type: "html",
                double_optin: false,
                update_existing: true,
            },
        )
        .await
    }

    #[tracing::instrument(name = "Unsubscribe member", skip(self))]
    async fn unsubscribe_member(
        &self,
        list_id: &ListId,
        email: &str,
        delete: bool,
    ) -> RemoteResult<()> {
        let response: CompleteResponse = self
            .call(
                "lists/unsubscribe",
                UnsubscribeParams {
                    id: list_id.as_ref(),
                    email: EmailStruct { email },
                    delete_member: delete,
                },
            )
            .await?;

        response.into_result("lists/unsubscribe")
    }

    #[tracing::instrument(name = "Update member", skip(self, merge_vars))]
    async fn update_member(
        &self,
        list_id: &ListId,
        email: &str,
        merge_vars: &MergeVars,
    ) -> RemoteResult<MemberReceipt> {
        self.call(
            "lists/update-member",
            UpdateMemberParams {
                id: list_id.as_ref(),
                email: EmailStruct { email },
                merge_vars,
            },
        )
        .await
    }

    #[tracing::instrument(name = "List campaigns", skip(self))]
    async fn list_campaigns(&self, query: &CampaignQuery) -> RemoteResult<CampaignPage> {
        self.call("campaigns/list", query).await
    }

    #[tracing::instrument(name = "Delete campaign", skip(self))]
    async fn delete_campaign(&self, campaign_id: &str) -> RemoteResult<()> {
        let response: CompleteResponse = self
            .call("campaigns/delete", CampaignParams { cid: campaign_id })
            .await?;

        response.into_result("campaigns/delete")
    }

    #[tracing::instrument(name = "Fetch member activity", skip(self, emails), fields(count = emails.len()))]
    async fn member_activity(
        &self,
        list_id: &ListId,
        emails: &[String],
    ) -> RemoteResult<Vec<ActivityRecord>> {
        if emails.len() > MAX_ACTIVITY_EMAILS {
            return Err(RemoteError::InvalidRequest(format!(
                "member activity accepts at most {} emails, got {}",
                MAX_ACTIVITY_EMAILS,
                emails.len()
            )));
        }

        let response: DataResponse<ActivityRecord> = self
            .call(
                "lists/member-activity",
                MembersParams {
                    id: list_id.as_ref(),
                    emails: emails.iter().map(|email| EmailStruct { email }).collect(),
                },
            )
            .await?;

        Ok(response.data)
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a, P> {
    apikey: &'a str,
    #[serde(flatten)]
    params: P,
}

#[derive(Debug, Serialize)]
struct EmailStruct<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct ListsParams {
    limit: u32,
}

#[derive(Debug, Serialize)]
struct MergeVarsParams<'a> {
    id: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct MembersParams<'a> {
    id: &'a str,
    emails: Vec<EmailStruct<'a>>,
}

#[derive(Debug, Serialize)]
struct SubscribeParams<'a> {
    id: &'a str,
    email: EmailStruct<'a>,
    merge_vars: &'a MergeVars,
    email_type: &'static str,
    double_optin: bool,
    update_existing: bool,
}

#[derive(Debug, Serialize)]
struct UnsubscribeParams<'a> {
    id: &'a str,
    email: EmailStruct<'a>,
    delete_member: bool,
}

#[derive(Debug, Serialize)]
struct UpdateMemberParams<'a> {
    id: &'a str,
    email: EmailStruct<'a>,
    merge_vars: &'a MergeVars,
}

#[derive(Debug, Serialize)]
struct CampaignParams<'a> {
    cid: &'a str,
}

#[derive(Debug, Deserialize)]
struct DataResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ListMergeVars {
    merge_vars: Vec<MergeField>,
}

/// `{"complete": true}` acknowledgement; anything but a boolean is a protocol error
#[derive(Debug, Deserialize)]
struct CompleteResponse {
    complete: bool,
}

impl CompleteResponse {
    fn into_result(self, method: &str) -> RemoteResult<()> {
        if self.complete {
            Ok(())
        } else {
            Err(RemoteError::Rejected(format!("{} reported incomplete", method)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    name: String,
    error: String,
}
