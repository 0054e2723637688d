use crate::domain::{ListId, MemberInfo, User};
use crate::sync::{SyncContext, SyncResult};

impl SyncContext {
    /// Live remote membership record of `user` on `list_id`, any status
    pub(crate) async fn member(&self, user: &User, list_id: &ListId) -> SyncResult<Option<MemberInfo>> {
        if user.email.is_empty() || list_id.is_empty() {
            tracing::debug!(user_id = user.id, "Empty email or list id, no membership");
            return Ok(None);
        }

        Ok(self.remote.lookup_member(list_id, &user.email).await?)
    }

    /// The membership record, only when its status is exactly "subscribed"
    pub(crate) async fn subscription(
        &self,
        user: &User,
        list_id: &ListId,
    ) -> SyncResult<Option<MemberInfo>> {
        Ok(self
            .member(user, list_id)
            .await?
            .filter(MemberInfo::is_subscribed))
    }

    /// [`SyncContext::subscription`] under the do-not-email policy, with
    /// lookup failures read as "not subscribed"
    pub(crate) async fn is_subscribed(&self, user: &User, list_id: &ListId) -> Option<MemberInfo> {
        if self.policy.is_suppressed(user.id).await {
            return None;
        }

        match self.subscription(user, list_id).await {
            Ok(member) => member,
            Err(e) => {
                tracing::warn!(user_id = user.id, list_id = %list_id, "Membership lookup failed: {}", e);
                None
            }
        }
    }
}
