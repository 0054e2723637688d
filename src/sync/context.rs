use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use secrecy::Secret;

use crate::client::RemoteService;
use crate::domain::{ListId, ListInfo, ListMap};
use crate::host::{DeferredTasks, NoSuppression, SuppressionPolicy, SyncObserver, TracingObserver, UserDirectory};
use crate::mapping::{ExtractorRegistry, FieldMapper, MappingError};
use crate::repo::StatusStore;
use crate::settings::ListSettings;

/// The locally configured lists and their webhook secrets
#[derive(Debug, Default)]
pub struct ListCatalog {
    lists: ListMap,
    secrets: HashMap<ListId, Secret<String>>,
}

impl ListCatalog {
    pub fn lists(&self) -> &ListMap {
        &self.lists
    }

    pub fn get(&self, list_id: &ListId) -> Option<&ListInfo> {
        self.lists.get(list_id)
    }

    pub fn contains(&self, list_id: &ListId) -> bool {
        self.lists.contains_key(list_id)
    }

    pub fn webhook_secret(&self, list_id: &ListId) -> Option<&Secret<String>> {
        self.secrets.get(list_id)
    }
}

/// Everything a synchronization needs, passed explicitly to each component
pub struct SyncContext {
    pub catalog: ListCatalog,
    pub mapper: FieldMapper,
    pub remote: Arc<dyn RemoteService>,
    pub store: Arc<dyn StatusStore>,
    pub users: Arc<dyn UserDirectory>,
    pub policy: Arc<dyn SuppressionPolicy>,
    /// Without a task facility deferred work runs inline
    pub tasks: Option<Arc<dyn DeferredTasks>>,
    pub observer: Arc<dyn SyncObserver>,
}

impl SyncContext {
    pub fn builder(
        remote: Arc<dyn RemoteService>,
        store: Arc<dyn StatusStore>,
        users: Arc<dyn UserDirectory>,
    ) -> SyncContextBuilder {
        SyncContextBuilder {
            remote,
            store,
            users,
            lists: BTreeMap::new(),
            extractors: ExtractorRegistry::default(),
            policy: Arc::new(NoSuppression),
            tasks: None,
            observer: Arc::new(TracingObserver),
        }
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("catalog", &self.catalog)
            .field("mapper", &self.mapper)
            .field("deferred", &self.tasks.is_some())
            .finish_non_exhaustive()
    }
}

pub struct SyncContextBuilder {
    remote: Arc<dyn RemoteService>,
    store: Arc<dyn StatusStore>,
    users: Arc<dyn UserDirectory>,
    lists: BTreeMap<String, ListSettings>,
    extractors: ExtractorRegistry,
    policy: Arc<dyn SuppressionPolicy>,
    tasks: Option<Arc<dyn DeferredTasks>>,
    observer: Arc<dyn SyncObserver>,
}

impl SyncContextBuilder {
    /// Configured lists, keyed as in the settings file
    pub fn lists(mut self, lists: BTreeMap<String, ListSettings>) -> Self {
        self.lists = lists;
        self
    }

    pub fn extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn suppression(mut self, policy: Arc<dyn SuppressionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn tasks(mut self, tasks: Arc<dyn DeferredTasks>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Compile the field maps; fails on extractors missing from the registry
    pub fn build(self) -> Result<SyncContext, MappingError> {
        let mut catalog = ListCatalog::default();
        let mut field_maps = Vec::with_capacity(self.lists.len());

        for (key, settings) in self.lists {
            let id = settings.list_id(&key);
            catalog.lists.insert(
                id.clone(),
                ListInfo {
                    id: id.clone(),
                    name: settings.name,
                    web_id: None,
                },
            );
            if let Some(secret) = settings.webhook_secret {
                catalog.secrets.insert(id.clone(), secret);
            }
            field_maps.push((id, settings.field_map));
        }

        let mapper = FieldMapper::compile(
            field_maps.iter().map(|(id, field_map)| (id, field_map)),
            &self.extractors,
        )?;

        Ok(SyncContext {
            catalog,
            mapper,
            remote: self.remote,
            store: self.store,
            users: self.users,
            policy: self.policy,
            tasks: self.tasks,
            observer: self.observer,
        })
    }
}
