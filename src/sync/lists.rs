use std::fmt;
use std::str::FromStr;

use crate::domain::{ListInfo, ListMap, User};
use crate::sync::{SyncContext, SyncError, SyncResult};

/// Where a list set comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListSource {
    /// Lists declared in configuration
    Config,
    /// Lists the remote service reports
    Remote,
    /// Lists present both in configuration and remotely
    #[default]
    Merged,
    /// Merged lists the user is subscribed to
    User,
}

impl ListSource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Config => "config",
            Self::Remote => "remote",
            Self::Merged => "merged",
            Self::User => "user",
        }
    }
}

impl FromStr for ListSource {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "config" => Ok(Self::Config),
            "remote" | "mc" => Ok(Self::Remote),
            "merged" => Ok(Self::Merged),
            "user" => Ok(Self::User),
            other => Err(SyncError::InvalidSource(other.to_string())),
        }
    }
}

impl fmt::Display for ListSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes effective list sets.
///
/// A failed remote enumeration is an `Err`, never an empty map: callers can
/// tell "could not determine" apart from "no lists".
#[derive(Debug, Clone, Copy)]
pub struct ListResolver<'a> {
    ctx: &'a SyncContext,
}

impl<'a> ListResolver<'a> {
    pub fn new(ctx: &'a SyncContext) -> Self {
        Self { ctx }
    }

    pub async fn resolve(&self, source: ListSource, user: Option<&User>) -> SyncResult<ListMap> {
        match source {
            ListSource::Config => Ok(self.config()),
            ListSource::Remote => self.remote().await,
            ListSource::Merged => self.merged().await,
            ListSource::User => match user {
                Some(user) => self.for_user(user).await,
                None => Err(SyncError::UserNotFound(
                    "no user given for the user list source".into(),
                )),
            },
        }
    }

    pub fn config(&self) -> ListMap {
        self.ctx.catalog.lists().clone()
    }

    #[tracing::instrument(name = "Resolve remote lists", skip(self))]
    pub async fn remote(&self) -> SyncResult<ListMap> {
        let lists = self.ctx.remote.enumerate_lists().await.map_err(|e| {
            let e = SyncError::from(e);
            tracing::error!("Failed to enumerate remote lists: {}", e);
            e
        })?;

        Ok(lists.into_iter().map(|list| (list.id.clone(), list)).collect())
    }

    /// Configured lists that also exist remotely, with their configured data
    #[tracing::instrument(name = "Resolve merged lists", skip(self))]
    pub async fn merged(&self) -> SyncResult<ListMap> {
        let remote = self.remote().await?;

        Ok(self
            .config()
            .into_iter()
            .filter(|(id, _)| remote.contains_key(id))
            .collect())
    }

    #[tracing::instrument(name = "Resolve user lists", skip(self, user), fields(user_id = user.id))]
    pub async fn for_user(&self, user: &User) -> SyncResult<ListMap> {
        let mut lists = ListMap::new();
        for (id, list) in self.merged().await? {
            if self.ctx.is_subscribed(user, &id).await.is_some() {
                lists.insert(id, list);
            }
        }

        Ok(lists)
    }

    /// Look a list up by id, falling back to its display name
    pub async fn find(&self, identifier: &str, source: ListSource) -> SyncResult<Option<ListInfo>> {
        let lists = self.resolve(source, None).await?;

        let list = lists
            .values()
            .find(|list| list.id.as_ref() == identifier)
            .or_else(|| lists.values().find(|list| list.name == identifier))
            .cloned();

        if list.is_none() {
            tracing::debug!(identifier, source = %source, "No list found with that id or name");
        }

        Ok(list)
    }
}
