use std::sync::Arc;

use serde::Serialize;

use crate::client::{ActivityRecord, CampaignPage, CampaignQuery, MergeField, MAX_ACTIVITY_EMAILS};
use crate::domain::{
    EmailAddress, ListId, ListInfo, MemberInfo, MemberReceipt, MemberStatus, MergeVars,
    RemoteInfo, SubscriberStatus, SyncAction, User, UserId, UserRef, EMAIL, GROUPINGS,
};
use crate::host::{DeferredJob, DeferredOperation};
use crate::repo::Triggers;
use crate::sync::{ListResolver, ListSource, SyncContext, SyncError, SyncResult};

/// Result of a mutation that may have been handed to the task facility
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome<T> {
    Completed(T),
    Queued,
}

impl<T> SyncOutcome<T> {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsubscribed {
    /// The remote service removed the member
    Removed,
    /// The member was not subscribed; no remote call was made
    AlreadyUnsubscribed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeOptions {
    merge_vars: Option<MergeVars>,
    defer: bool,
    action: SyncAction,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            merge_vars: None,
            defer: false,
            action: SyncAction::Subscribe,
        }
    }
}

impl SubscribeOptions {
    /// Send these merge vars instead of computing them
    pub fn merge_vars(mut self, merge_vars: MergeVars) -> Self {
        self.merge_vars = Some(merge_vars);
        self
    }

    pub fn deferred(mut self, defer: bool) -> Self {
        self.defer = defer;
        self
    }

    /// Action recorded in the status snapshot
    pub fn action(mut self, action: SyncAction) -> Self {
        self.action = action;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubscribeOptions {
    delete: bool,
    defer: bool,
    action: SyncAction,
}

impl Default for UnsubscribeOptions {
    fn default() -> Self {
        Self {
            delete: false,
            defer: false,
            action: SyncAction::Unsubscribe,
        }
    }
}

impl UnsubscribeOptions {
    /// Purge the member record instead of marking it unsubscribed
    pub fn delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    pub fn deferred(mut self, defer: bool) -> Self {
        self.defer = defer;
        self
    }

    pub fn action(mut self, action: SyncAction) -> Self {
        self.action = action;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The address changed; members were updated under the old address
    EmailChanged(Vec<(ListId, MemberReceipt)>),
    /// Same address; the user was resubscribed with fresh merge vars
    Resubscribed(Vec<(ListId, SyncOutcome<MemberReceipt>)>),
}

/// What the status store knows about a user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub status: Option<SubscriberStatus>,
    pub remote_info: RemoteInfo,
}

/// Subscribes, unsubscribes and updates users on remote lists, then records
/// the outcome in the status store
#[derive(Debug, Clone)]
pub struct SubscriptionEngine {
    ctx: Arc<SyncContext>,
}

impl SubscriptionEngine {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn lists(&self) -> ListResolver<'_> {
        ListResolver::new(&self.ctx)
    }

    /// Look a list up by id or display name
    pub async fn list_data(&self, identifier: &str, source: ListSource) -> SyncResult<Option<ListInfo>> {
        self.lists().find(identifier, source).await
    }

    #[tracing::instrument(name = "Resolve user", skip(self))]
    pub async fn resolve_user(&self, user_ref: UserRef) -> SyncResult<User> {
        let user = match &user_ref {
            UserRef::User(user) => return Ok(user.clone()),
            UserRef::Id(id) => self.ctx.users.find_by_id(*id).await?,
            UserRef::Email(email) => self.ctx.users.find_by_email(email.trim()).await?,
        };

        user.ok_or_else(|| SyncError::UserNotFound(user_ref.to_string()))
    }

    /// Merge vars for `user` on a configured list: every remote merge field
    /// plus the configured tags, and always `GROUPINGS`
    #[tracing::instrument(name = "Compute merge vars", skip(self, user), fields(user_id = user.id))]
    pub async fn merge_vars(&self, user: &User, list_id: &ListId) -> SyncResult<MergeVars> {
        if !self.ctx.catalog.contains(list_id) {
            return Err(SyncError::UnknownList(list_id.clone()));
        }

        let mut tags = match self.ctx.remote.merge_fields(list_id).await {
            Ok(fields) => fields.into_iter().map(|MergeField { tag, .. }| tag).collect(),
            Err(e) => {
                tracing::warn!(list_id = %list_id, "Falling back to configured merge tags: {}", e);
                Vec::new()
            }
        };
        tags.extend(self.ctx.mapper.tags(list_id));
        tags.retain(|tag| !tag.eq_ignore_ascii_case(GROUPINGS));

        if tags.is_empty() {
            return Err(SyncError::NoMergeVars(list_id.clone()));
        }

        let mut merge_vars = MergeVars::new();
        for tag in tags {
            merge_vars.insert(&tag, self.ctx.mapper.map(user, list_id, &tag));
        }
        merge_vars.insert(GROUPINGS, self.ctx.mapper.map(user, list_id, GROUPINGS));

        let email_missing = merge_vars
            .get(EMAIL)
            .map_or(true, |email| email.as_str().map_or(false, str::is_empty));
        if email_missing {
            merge_vars.set(EMAIL, user.email.clone());
        }

        Ok(merge_vars)
    }

    /// Raw remote membership record, whatever its status
    pub async fn member(&self, user: &User, list_id: &ListId) -> SyncResult<Option<MemberInfo>> {
        self.ctx.member(user, list_id).await
    }

    /// The membership record when the user is subscribed and not suppressed
    pub async fn is_subscribed(&self, user: &User, list_id: &ListId) -> Option<MemberInfo> {
        self.ctx.is_subscribed(user, list_id).await
    }

    pub async fn is_unsubscribed(&self, user: &User, list_id: &ListId) -> bool {
        self.is_subscribed(user, list_id).await.is_none()
    }

    /// Merged lists the user is not subscribed to
    pub async fn unsubscribed_lists(&self, user: &User) -> SyncResult<Vec<ListId>> {
        let mut unsubscribed = Vec::new();
        for list_id in self.lists().merged().await?.into_keys() {
            if self.is_unsubscribed(user, &list_id).await {
                unsubscribed.push(list_id);
            }
        }

        Ok(unsubscribed)
    }

    #[tracing::instrument(
        name = "Subscribe user to list",
        skip(self, user_ref, options),
        fields(list_id = %list_id)
    )]
    pub async fn subscribe(
        &self,
        user_ref: impl Into<UserRef>,
        list_id: &ListId,
        options: SubscribeOptions,
    ) -> SyncResult<SyncOutcome<MemberReceipt>> {
        let result = match self.resolve_user(user_ref.into()).await {
            Ok(user) => self.subscribe_user(&user, list_id, options).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            e.log("subscribe");
        }
        result
    }

    /// Subscribe to each list, or to every merged list when `lists` is
    /// `None`. A failing list does not stop the others and nothing is rolled
    /// back.
    #[tracing::instrument(name = "Subscribe user to lists", skip(self, user_ref, lists, options))]
    pub async fn subscribe_all(
        &self,
        user_ref: impl Into<UserRef>,
        lists: Option<Vec<ListId>>,
        options: SubscribeOptions,
    ) -> SyncResult<Vec<(ListId, SyncOutcome<MemberReceipt>)>> {
        let result = self.subscribe_batch(user_ref.into(), lists, options).await;
        if let Err(e) = &result {
            e.log("subscribe_all");
        }
        result
    }

    async fn subscribe_batch(
        &self,
        user_ref: UserRef,
        lists: Option<Vec<ListId>>,
        options: SubscribeOptions,
    ) -> SyncResult<Vec<(ListId, SyncOutcome<MemberReceipt>)>> {
        let user = self.resolve_user(user_ref).await?;
        self.ensure_not_suppressed(&user).await?;

        let mut batch = Batch::default();
        for list_id in self.target_lists(lists).await? {
            let result = self.subscribe_user(&user, &list_id, options.clone()).await;
            batch.push(list_id, result);
        }

        batch.finish()
    }

    async fn subscribe_user(
        &self,
        user: &User,
        list_id: &ListId,
        options: SubscribeOptions,
    ) -> SyncResult<SyncOutcome<MemberReceipt>> {
        self.ensure_not_suppressed(user).await?;

        let SubscribeOptions {
            merge_vars,
            defer,
            action,
        } = options;

        let merge_vars = match merge_vars {
            Some(merge_vars) => merge_vars,
            None => self.merge_vars(user, list_id).await?,
        };

        if defer
            && self.defer(DeferredJob {
                user_id: user.id,
                list_id: list_id.clone(),
                operation: DeferredOperation::Subscribe {
                    merge_vars: Some(merge_vars.clone()),
                    action,
                },
            })?
        {
            return Ok(SyncOutcome::Queued);
        }

        let receipt = self
            .ctx
            .remote
            .subscribe_member(list_id, &user.email, &merge_vars)
            .await?;
        tracing::info!(user_id = user.id, list_id = %list_id, "User subscribed");

        self.record(user, list_id, action, "subscribe").await?;

        Ok(SyncOutcome::Completed(receipt))
    }

    #[tracing::instrument(
        name = "Unsubscribe user from list",
        skip(self, user_ref, options),
        fields(list_id = %list_id)
    )]
    pub async fn unsubscribe(
        &self,
        user_ref: impl Into<UserRef>,
        list_id: &ListId,
        options: UnsubscribeOptions,
    ) -> SyncResult<SyncOutcome<Unsubscribed>> {
        let result = match self.resolve_user(user_ref.into()).await {
            Ok(user) => self.unsubscribe_user(&user, list_id, options).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            e.log("unsubscribe");
        }
        result
    }

    /// Unsubscribe from each list, or from every merged list when `lists`
    /// is `None`; succeeds only if every list does
    #[tracing::instrument(name = "Unsubscribe user from lists", skip(self, user_ref, lists, options))]
    pub async fn unsubscribe_all(
        &self,
        user_ref: impl Into<UserRef>,
        lists: Option<Vec<ListId>>,
        options: UnsubscribeOptions,
    ) -> SyncResult<Vec<(ListId, SyncOutcome<Unsubscribed>)>> {
        let result = self.unsubscribe_batch(user_ref.into(), lists, options).await;
        if let Err(e) = &result {
            e.log("unsubscribe_all");
        }
        result
    }

    async fn unsubscribe_batch(
        &self,
        user_ref: UserRef,
        lists: Option<Vec<ListId>>,
        options: UnsubscribeOptions,
    ) -> SyncResult<Vec<(ListId, SyncOutcome<Unsubscribed>)>> {
        let user = self.resolve_user(user_ref).await?;

        let mut batch = Batch::default();
        for list_id in self.target_lists(lists).await? {
            let result = self.unsubscribe_user(&user, &list_id, options).await;
            batch.push(list_id, result);
        }

        batch.finish()
    }

    async fn unsubscribe_user(
        &self,
        user: &User,
        list_id: &ListId,
        options: UnsubscribeOptions,
    ) -> SyncResult<SyncOutcome<Unsubscribed>> {
        let UnsubscribeOptions {
            delete,
            defer,
            action,
        } = options;

        if defer
            && self.defer(DeferredJob {
                user_id: user.id,
                list_id: list_id.clone(),
                operation: DeferredOperation::Unsubscribe { delete, action },
            })?
        {
            return Ok(SyncOutcome::Queued);
        }

        match self.ctx.subscription(user, list_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::debug!(user_id = user.id, list_id = %list_id, "Already unsubscribed");
                self.save_status(user, action, "unsubscribe").await?;
                return Ok(SyncOutcome::Completed(Unsubscribed::AlreadyUnsubscribed));
            }
            Err(e) => {
                tracing::warn!(
                    user_id = user.id,
                    list_id = %list_id,
                    "Membership lookup failed, unsubscribing anyway: {}",
                    e
                );
            }
        }

        self.ctx
            .remote
            .unsubscribe_member(list_id, &user.email, delete)
            .await?;
        tracing::info!(user_id = user.id, list_id = %list_id, delete, "User unsubscribed");

        self.record(user, list_id, action, "unsubscribe").await?;

        Ok(SyncOutcome::Completed(Unsubscribed::Removed))
    }

    /// Push a profile change. A different `new_email` goes through
    /// [`SubscriptionEngine::update_email`]; otherwise the user is
    /// resubscribed to every merged list with fresh merge vars.
    #[tracing::instrument(name = "Update user", skip(self, user_ref, new_email))]
    pub async fn update(
        &self,
        user_ref: impl Into<UserRef>,
        new_email: Option<&str>,
        defer: bool,
    ) -> SyncResult<UpdateOutcome> {
        let user = self.resolve_user(user_ref.into()).await.map_err(|e| {
            e.log("update");
            e
        })?;

        match new_email {
            Some(new_email) if !new_email.trim().eq_ignore_ascii_case(user.email.trim()) => self
                .update_email(user, new_email)
                .await
                .map(UpdateOutcome::EmailChanged),
            _ => {
                let options = SubscribeOptions::default()
                    .deferred(defer)
                    .action(SyncAction::Update);
                self.subscribe_all(user, None, options)
                    .await
                    .map(UpdateOutcome::Resubscribed)
            }
        }
    }

    /// Move the remote members of every merged list to `new_email`.
    ///
    /// Members are addressed by the user's current email, so this must run
    /// before the host stores the new address.
    #[tracing::instrument(name = "Update user email", skip(self, user_ref))]
    pub async fn update_email(
        &self,
        user_ref: impl Into<UserRef>,
        new_email: &str,
    ) -> SyncResult<Vec<(ListId, MemberReceipt)>> {
        let result = self.update_email_batch(user_ref.into(), new_email).await;
        if let Err(e) = &result {
            e.log("update_email");
        }
        result
    }

    async fn update_email_batch(
        &self,
        user_ref: UserRef,
        new_email: &str,
    ) -> SyncResult<Vec<(ListId, MemberReceipt)>> {
        // Validated only; the remote service gets the address as the host stores it
        new_email
            .parse::<EmailAddress>()
            .map_err(SyncError::InvalidEmail)?;
        let new_email = new_email.trim();
        let user = self.resolve_user(user_ref).await?;

        let mut batch = Batch::default();
        for list_id in self.lists().merged().await?.into_keys() {
            let result = self.update_member_email(&user, &list_id, new_email).await;
            batch.push(list_id, result);
        }

        batch.finish()
    }

    async fn update_member_email(
        &self,
        user: &User,
        list_id: &ListId,
        new_email: &str,
    ) -> SyncResult<MemberReceipt> {
        let mut merge_vars = self.merge_vars(user, list_id).await?;
        merge_vars.set(EMAIL, new_email);

        let receipt = self
            .ctx
            .remote
            .update_member(list_id, &user.email, &merge_vars)
            .await?;
        tracing::info!(user_id = user.id, list_id = %list_id, "Member email updated");

        Ok(receipt)
    }

    /// Refresh the cached remote metadata for one list, dropping the entry
    /// when the user is no longer subscribed
    #[tracing::instrument(name = "Sync remote info", skip(self, user), fields(user_id = user.id))]
    pub async fn sync_remote_info(&self, user: &User, list_id: &ListId) -> SyncResult<RemoteInfo> {
        let member = self.ctx.member(user, list_id).await?;
        let mut info = self.ctx.store.remote_info(user.id).await?;

        match member.filter(MemberInfo::is_subscribed) {
            Some(member) => info.insert(list_id.clone(), (&member).into()),
            None => {
                info.remove(list_id);
            }
        }

        self.ctx
            .store
            .save_remote_info(user.id, &info, Triggers::Suppress)
            .await?;

        Ok(info)
    }

    /// Bring every merged list in line with the remote state: members the
    /// remote service marks unsubscribed are unsubscribed, everyone else is
    /// subscribed
    #[tracing::instrument(name = "Resync user", skip(self, user_ref))]
    pub async fn resync(&self, user_ref: impl Into<UserRef>) -> SyncResult<Profile> {
        let user = self.resolve_user(user_ref.into()).await.map_err(|e| {
            e.log("resync");
            e
        })?;

        for list_id in self.lists().merged().await?.into_keys() {
            let result = match self.ctx.member(&user, &list_id).await {
                Ok(Some(member)) if member.status == MemberStatus::Unsubscribed => self
                    .unsubscribe_user(&user, &list_id, UnsubscribeOptions::default())
                    .await
                    .map(|_| ()),
                Ok(_) => self
                    .subscribe_user(&user, &list_id, SubscribeOptions::default())
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                tracing::warn!(user_id = user.id, list_id = %list_id, "Resync failed: {}", e);
            }
        }

        self.profile(user.id).await
    }

    /// The stored status and remote info of a user
    pub async fn profile(&self, user_id: UserId) -> SyncResult<Profile> {
        Ok(Profile {
            status: self.ctx.store.status(user_id).await?,
            remote_info: self.ctx.store.remote_info(user_id).await?,
        })
    }

    /// First non-zero member rating across the user's lists
    pub async fn subscriber_rating(&self, user_id: UserId) -> SyncResult<Option<u8>> {
        Ok(self.ctx.store.remote_info(user_id).await?.member_rating())
    }

    #[tracing::instrument(name = "List campaigns", skip(self))]
    pub async fn campaigns(&self, query: &CampaignQuery) -> SyncResult<CampaignPage> {
        self.ctx.remote.list_campaigns(query).await.map_err(|e| {
            let e = SyncError::from(e);
            e.log("campaigns");
            e
        })
    }

    #[tracing::instrument(name = "Delete campaign", skip(self))]
    pub async fn delete_campaign(&self, campaign_id: &str) -> SyncResult<()> {
        self.ctx
            .remote
            .delete_campaign(campaign_id)
            .await
            .map_err(|e| {
                let e = SyncError::from(e);
                e.log("delete_campaign");
                e
            })
    }

    /// Open and click history for up to 50 addresses
    #[tracing::instrument(name = "Member activity", skip(self, emails))]
    pub async fn member_activity(
        &self,
        list_id: &ListId,
        emails: &[String],
    ) -> SyncResult<Vec<ActivityRecord>> {
        if emails.len() > MAX_ACTIVITY_EMAILS {
            tracing::warn!(
                count = emails.len(),
                "Member activity is limited to {} emails per call",
                MAX_ACTIVITY_EMAILS
            );
        }

        self.ctx
            .remote
            .member_activity(list_id, emails)
            .await
            .map_err(|e| {
                let e = SyncError::from(e);
                e.log("member_activity");
                e
            })
    }

    /// Replay a deferred job inline
    #[tracing::instrument(name = "Run deferred job", skip(self, job), fields(user_id = job.user_id, list_id = %job.list_id))]
    pub async fn run_job(&self, job: DeferredJob) -> SyncResult<()> {
        match job.operation {
            DeferredOperation::Subscribe { merge_vars, action } => {
                let mut options = SubscribeOptions::default().action(action);
                options.merge_vars = merge_vars;
                self.subscribe(job.user_id, &job.list_id, options).await?;
            }
            DeferredOperation::Unsubscribe { delete, action } => {
                let options = UnsubscribeOptions::default().delete(delete).action(action);
                self.unsubscribe(job.user_id, &job.list_id, options).await?;
            }
        }

        Ok(())
    }

    async fn ensure_not_suppressed(&self, user: &User) -> SyncResult<()> {
        if self.ctx.policy.is_suppressed(user.id).await {
            return Err(SyncError::Suppressed(user.id));
        }
        Ok(())
    }

    async fn target_lists(&self, lists: Option<Vec<ListId>>) -> SyncResult<Vec<ListId>> {
        match lists {
            Some(lists) => Ok(lists),
            None => Ok(self.lists().merged().await?.into_keys().collect()),
        }
    }

    /// Hand a job to the task facility; `false` when there is none and the
    /// caller should run it inline
    fn defer(&self, job: DeferredJob) -> SyncResult<bool> {
        match &self.ctx.tasks {
            Some(tasks) => {
                tasks.schedule(job)?;
                Ok(true)
            }
            None => {
                tracing::debug!("No deferred task facility, running inline");
                Ok(false)
            }
        }
    }

    /// Post-mutation bookkeeping: status snapshot, remote info, notification
    async fn record(
        &self,
        user: &User,
        list_id: &ListId,
        action: SyncAction,
        source_function: &str,
    ) -> SyncResult<()> {
        self.save_status(user, action, source_function).await?;

        if let Err(e) = self.sync_remote_info(user, list_id).await {
            tracing::warn!(user_id = user.id, list_id = %list_id, "Failed to sync remote info: {}", e);
        }

        self.ctx.observer.synchronized(user, list_id);

        Ok(())
    }

    /// Snapshot the user's memberships across the merged lists
    async fn save_status(
        &self,
        user: &User,
        action: SyncAction,
        source_function: &str,
    ) -> SyncResult<SubscriberStatus> {
        let status = match self.lists().merged().await {
            Ok(lists) => {
                let mut memberships = Vec::with_capacity(lists.len());
                for list_id in lists.into_keys() {
                    match self.ctx.subscription(user, &list_id).await {
                        Ok(member) => memberships.push((list_id, member.is_some())),
                        Err(e) => tracing::warn!(
                            user_id = user.id,
                            list_id = %list_id,
                            "Membership unknown, left out of the status: {}",
                            e
                        ),
                    }
                }
                SubscriberStatus::new(action, source_function, memberships)
            }
            Err(e) => {
                tracing::warn!(user_id = user.id, "Lists unknown, keeping previous memberships: {}", e);
                let mut status = SubscriberStatus::new(action, source_function, Vec::new());
                if let Some(previous) = self.ctx.store.status(user.id).await? {
                    status.subscriptions = previous.subscriptions;
                    status.unsubscribed = previous.unsubscribed;
                }
                status
            }
        };

        if !status.unsubscribed.is_empty() {
            self.ctx.observer.do_not_email(user.id, true);
        }

        self.ctx
            .store
            .save_status(user.id, &status, Triggers::Suppress)
            .await?;

        Ok(status)
    }
}

/// Per-list results of a batch operation
struct Batch<T> {
    succeeded: Vec<(ListId, T)>,
    failed: Vec<(ListId, SyncError)>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> Batch<T> {
    fn push(&mut self, list_id: ListId, result: SyncResult<T>) {
        match result {
            Ok(value) => self.succeeded.push((list_id, value)),
            Err(e) => self.failed.push((list_id, e)),
        }
    }

    fn finish(self) -> SyncResult<Vec<(ListId, T)>> {
        if self.failed.is_empty() {
            return Ok(self.succeeded);
        }

        Err(SyncError::PartialFailure {
            succeeded: self.succeeded.into_iter().map(|(id, _)| id).collect(),
            failed: self.failed,
        })
    }
}
