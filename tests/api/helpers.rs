use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use reqwest::{Client, Method, Response};

use secrecy::Secret;

use serde_json::{json, Value};

use mailsync::app;
use mailsync::client::{
    ActivityRecord, CampaignInfo, CampaignPage, CampaignQuery, MergeField, RemoteError,
    RemoteResult, RemoteService,
};
use mailsync::domain::{
    ListId, ListInfo, MemberInfo, MemberReceipt, MemberStatus, MergeVars, User, UserId, EMAIL,
};
use mailsync::host::{DeferredJob, DeferredTasks, SuppressionPolicy, SyncObserver, TaskError, UserDirectory};
use mailsync::repo::{MemoryStatusStore, StoreResult};
use mailsync::settings::{AdminSettings, ListSettings};
use mailsync::sync::{EventBridge, SubscriptionEngine, SyncContext};

pub const L1_SECRET: &str = "l1-webhook-secret";

pub fn list(id: &str) -> ListId {
    ListId::new(id)
}

/// A call made against the fake remote service
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    EnumerateLists,
    MergeFields(ListId),
    LookupMember(ListId, String),
    Subscribe(ListId, String, Value),
    Unsubscribe(ListId, String, bool),
    UpdateMember(ListId, String, Value),
    ListCampaigns,
    DeleteCampaign(String),
    MemberActivity(ListId, usize),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Subscribe(..) | Self::Unsubscribe(..) | Self::UpdateMember(..)
        )
    }
}

#[derive(Debug, Default)]
struct RemoteState {
    lists: Vec<ListInfo>,
    merge_fields: HashMap<ListId, Vec<String>>,
    members: HashMap<(ListId, String), MemberInfo>,
    failing: HashSet<ListId>,
    enumeration_fails: bool,
    calls: Vec<Call>,
}

/// In-memory stand-in for the email service, recording every call
#[derive(Debug, Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
}

impl FakeRemote {
    pub fn new(lists: &[(&str, &str)]) -> Self {
        let remote = Self::default();
        {
            let mut state = remote.state.lock().unwrap();
            for (id, name) in lists {
                state.lists.push(ListInfo {
                    id: list(id),
                    name: name.to_string(),
                    web_id: None,
                });
                state
                    .merge_fields
                    .insert(list(id), vec![EMAIL.to_string(), "FNAME".to_string()]);
            }
        }
        remote
    }

    pub fn add_member(&self, list_id: &str, email: &str, status: MemberStatus) {
        let mut state = self.state.lock().unwrap();
        let member = member(email, status);
        state.members.insert((list(list_id), email.to_lowercase()), member);
    }

    pub fn member_status(&self, list_id: &str, email: &str) -> Option<MemberStatus> {
        let state = self.state.lock().unwrap();
        state
            .members
            .get(&(list(list_id), email.to_lowercase()))
            .map(|member| member.status)
    }

    /// Make every mutation on `list_id` fail with an API error
    pub fn fail_mutations_on(&self, list_id: &str) {
        self.state.lock().unwrap().failing.insert(list(list_id));
    }

    pub fn fail_enumeration(&self) {
        self.state.lock().unwrap().enumeration_fails = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn check_failing(&self, list_id: &ListId) -> RemoteResult<()> {
        if self.state.lock().unwrap().failing.contains(list_id) {
            return Err(RemoteError::Api {
                code: -99,
                name: "Unknown_Exception".into(),
                message: format!("list {} is failing", list_id),
            });
        }
        Ok(())
    }
}

fn member(email: &str, status: MemberStatus) -> MemberInfo {
    MemberInfo {
        email: email.to_string(),
        euid: Some(format!("euid-{}", email)),
        status,
        web_id: Some(1000 + email.len() as u64),
        member_rating: Some(3),
        geo: None,
    }
}

#[async_trait]
impl RemoteService for FakeRemote {
    async fn enumerate_lists(&self) -> RemoteResult<Vec<ListInfo>> {
        self.record(Call::EnumerateLists);
        let state = self.state.lock().unwrap();
        if state.enumeration_fails {
            return Err(RemoteError::Protocol("lists/list: expected an object".into()));
        }
        Ok(state.lists.clone())
    }

    async fn merge_fields(&self, list_id: &ListId) -> RemoteResult<Vec<MergeField>> {
        self.record(Call::MergeFields(list_id.clone()));
        let state = self.state.lock().unwrap();
        Ok(state
            .merge_fields
            .get(list_id)
            .map(|tags| {
                tags.iter()
                    .map(|tag| MergeField {
                        tag: tag.clone(),
                        name: None,
                        req: tag == EMAIL,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn lookup_member(&self, list_id: &ListId, email: &str) -> RemoteResult<Option<MemberInfo>> {
        self.record(Call::LookupMember(list_id.clone(), email.to_string()));
        let state = self.state.lock().unwrap();
        Ok(state
            .members
            .get(&(list_id.clone(), email.to_lowercase()))
            .cloned())
    }

    async fn subscribe_member(
        &self,
        list_id: &ListId,
        email: &str,
        merge_vars: &MergeVars,
    ) -> RemoteResult<MemberReceipt> {
        let merge_vars = serde_json::to_value(merge_vars).unwrap();
        self.record(Call::Subscribe(list_id.clone(), email.to_string(), merge_vars));
        self.check_failing(list_id)?;

        let mut state = self.state.lock().unwrap();
        let member = member(email, MemberStatus::Subscribed);
        let receipt = MemberReceipt {
            email: member.email.clone(),
            euid: member.euid.clone(),
        };
        state
            .members
            .insert((list_id.clone(), email.to_lowercase()), member);
        Ok(receipt)
    }

    async fn unsubscribe_member(&self, list_id: &ListId, email: &str, delete: bool) -> RemoteResult<()> {
        self.record(Call::Unsubscribe(list_id.clone(), email.to_string(), delete));
        self.check_failing(list_id)?;

        let mut state = self.state.lock().unwrap();
        let key = (list_id.clone(), email.to_lowercase());
        if delete {
            state.members.remove(&key);
        } else if let Some(member) = state.members.get_mut(&key) {
            member.status = MemberStatus::Unsubscribed;
        } else {
            return Err(RemoteError::Api {
                code: 215,
                name: "List_NotSubscribed".into(),
                message: format!("{} is not subscribed", email),
            });
        }
        Ok(())
    }

    async fn update_member(
        &self,
        list_id: &ListId,
        email: &str,
        merge_vars: &MergeVars,
    ) -> RemoteResult<MemberReceipt> {
        let new_email = merge_vars
            .get(EMAIL)
            .and_then(Value::as_str)
            .unwrap_or(email)
            .to_string();
        let merge_vars = serde_json::to_value(merge_vars).unwrap();
        self.record(Call::UpdateMember(list_id.clone(), email.to_string(), merge_vars));
        self.check_failing(list_id)?;

        let mut state = self.state.lock().unwrap();
        let Some(mut member) = state.members.remove(&(list_id.clone(), email.to_lowercase())) else {
            return Err(RemoteError::Api {
                code: 232,
                name: "Email_NotExists".into(),
                message: format!("{} is not on list {}", email, list_id),
            });
        };
        member.email = new_email.clone();
        state
            .members
            .insert((list_id.clone(), new_email.to_lowercase()), member);

        Ok(MemberReceipt {
            email: new_email,
            euid: None,
        })
    }

    async fn list_campaigns(&self, query: &CampaignQuery) -> RemoteResult<CampaignPage> {
        self.record(Call::ListCampaigns);
        let data = vec![CampaignInfo {
            id: "c1".into(),
            title: Some("Weekly".into()),
            status: Some("sent".into()),
            details: Default::default(),
        }];
        Ok(CampaignPage {
            total: data.len() as u64,
            data: data.into_iter().take(query.limit as usize).collect(),
        })
    }

    async fn delete_campaign(&self, campaign_id: &str) -> RemoteResult<()> {
        self.record(Call::DeleteCampaign(campaign_id.to_string()));
        if campaign_id == "c1" {
            Ok(())
        } else {
            Err(RemoteError::Rejected("campaigns/delete".into()))
        }
    }

    async fn member_activity(&self, list_id: &ListId, emails: &[String]) -> RemoteResult<Vec<ActivityRecord>> {
        self.record(Call::MemberActivity(list_id.clone(), emails.len()));
        Ok(emails
            .iter()
            .map(|email| ActivityRecord {
                email: json!({ "email": email }),
                activity: vec![json!({ "action": "open" })],
            })
            .collect())
    }
}

/// Host users and their do-not-email flags
#[derive(Debug, Default)]
pub struct MemoryUsers {
    users: Mutex<HashMap<UserId, User>>,
    suppressed: Mutex<HashSet<UserId>>,
}

impl MemoryUsers {
    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn suppress(&self, user_id: UserId) {
        self.suppressed.lock().unwrap().insert(user_id);
    }

    pub fn get(&self, user_id: UserId) -> User {
        self.users.lock().unwrap()[&user_id].clone()
    }
}

#[async_trait]
impl UserDirectory for MemoryUsers {
    async fn find_by_id(&self, user_id: UserId) -> StoreResult<Option<User>> {
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }
}

#[async_trait]
impl SuppressionPolicy for MemoryUsers {
    async fn is_suppressed(&self, user_id: UserId) -> bool {
        self.suppressed.lock().unwrap().contains(&user_id)
    }
}

#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub synchronized: Mutex<Vec<(UserId, ListId)>>,
    pub do_not_email: Mutex<Vec<(UserId, bool)>>,
}

impl SyncObserver for RecordingObserver {
    fn synchronized(&self, user: &User, list_id: &ListId) {
        self.synchronized
            .lock()
            .unwrap()
            .push((user.id, list_id.clone()));
    }

    fn do_not_email(&self, user_id: UserId, flag: bool) {
        self.do_not_email.lock().unwrap().push((user_id, flag));
    }
}

#[derive(Debug, Default)]
pub struct RecordingTasks {
    pub jobs: Mutex<Vec<DeferredJob>>,
}

impl DeferredTasks for RecordingTasks {
    fn schedule(&self, job: DeferredJob) -> Result<(), TaskError> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

pub fn alice() -> User {
    User {
        id: 1,
        login: "alice".into(),
        email: "alice@example.com".into(),
        attributes: [
            ("first_name".to_string(), json!("Alice")),
            ("interests".to_string(), json!("News")),
        ]
        .into(),
    }
}

pub fn bob() -> User {
    User {
        id: 2,
        login: "bob".into(),
        email: "bob@x.com".into(),
        attributes: BTreeMap::new(),
    }
}

/// Configured lists: L1 and L2 also exist remotely, L3 does not. The remote
/// service also reports R9, which is not configured.
pub fn list_settings() -> BTreeMap<String, ListSettings> {
    let l1 = ListSettings {
        id: Some("L1".into()),
        name: "General".into(),
        slug: Some("general".into()),
        webhook_secret: Some(Secret::new(L1_SECRET.to_string())),
        field_map: serde_json::from_value(json!({
            "FNAME": { "function": "user_meta", "args": "first_name" },
            "GROUPINGS": [
                { "name": "Interests", "function": "user_meta", "args": ["interests"] },
                { "name": "Roles", "function": "user_meta", "args": ["roles"] }
            ]
        }))
        .unwrap(),
    };
    let l2 = ListSettings {
        id: Some("L2".into()),
        name: "Weekly".into(),
        field_map: serde_json::from_value(json!({
            "FNAME": { "function": "user_meta", "args": "first_name" }
        }))
        .unwrap(),
        ..Default::default()
    };
    let l3 = ListSettings {
        id: Some("L3".into()),
        name: "Archive".into(),
        ..Default::default()
    };

    [
        ("general".to_string(), l1),
        ("weekly".to_string(), l2),
        ("archive".to_string(), l3),
    ]
    .into()
}

pub struct TestSync {
    pub engine: SubscriptionEngine,
    pub bridge: EventBridge,
    pub remote: Arc<FakeRemote>,
    pub store: Arc<MemoryStatusStore>,
    pub users: Arc<MemoryUsers>,
    pub observer: Arc<RecordingObserver>,
    pub tasks: Arc<RecordingTasks>,
}

impl TestSync {
    /// Engine without a deferred task facility
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Engine whose deferred jobs are recorded instead of run
    pub fn with_tasks() -> Self {
        Self::build(true)
    }

    fn build(with_tasks: bool) -> Self {
        let remote = Arc::new(FakeRemote::new(&[
            ("L1", "General"),
            ("L2", "Weekly"),
            ("R9", "Remote only"),
        ]));
        let store = Arc::new(MemoryStatusStore::new());
        let users = Arc::new(MemoryUsers::default());
        users.insert(alice());
        users.insert(bob());
        let observer = Arc::new(RecordingObserver::default());
        let tasks = Arc::new(RecordingTasks::default());

        let mut builder = SyncContext::builder(remote.clone(), store.clone(), users.clone())
            .lists(list_settings())
            .suppression(users.clone())
            .observer(observer.clone());
        if with_tasks {
            builder = builder.tasks(tasks.clone());
        }
        let context = builder.build().expect("Failed to build sync context");

        let engine = SubscriptionEngine::new(context);
        let bridge = EventBridge::new(engine.clone());

        Self {
            engine,
            bridge,
            remote,
            store,
            users,
            observer,
            tasks,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub struct TestApp {
    addr: String,

    pub client: Client,
    pub sync: TestSync,
    pub admin: Credentials,
}

impl TestApp {
    pub async fn spawn() -> Self {
        use argon2::password_hash::SaltString;
        use argon2::{Argon2, PasswordHasher};
        use rand::{distributions::Alphanumeric, Rng};

        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to listen on random port");
        let port = listener.local_addr().unwrap().port();

        let addr = format!("http://127.0.0.1:{}", port);

        let password: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        let salt = SaltString::generate(&mut rand::thread_rng());
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .expect("Failed to hash admin password")
            .to_string();

        let admin = Credentials {
            username: "admin".into(),
            password,
        };
        let admin_settings =
            AdminSettings::new(admin.username.clone(), Secret::new(password_hash));

        let sync = TestSync::new();

        let server = app::run(listener, sync.engine.clone(), admin_settings)
            .expect("Failed to spawn app instance");
        let _ = tokio::spawn(server);

        let client = Client::new();

        Self {
            addr,
            client,
            sync,
            admin,
        }
    }

    pub fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", &self.addr, url);
        self.client.request(method, url)
    }

    pub fn authorized_request(
        &self,
        method: Method,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> reqwest::RequestBuilder {
        let req = self.request(method, url);
        if let Some(creds) = credentials {
            req.basic_auth(creds.username.clone(), Some(creds.password.clone()))
        } else {
            req
        }
    }

    pub async fn health_check(&self) -> reqwest::Result<Response> {
        self.request(Method::GET, "health_check").send().await
    }

    pub async fn webhook_ping(&self) -> reqwest::Result<Response> {
        self.request(Method::GET, "webhooks/mailchimp").send().await
    }

    pub async fn webhook(&self, secret: Option<&str>, form: &[(&str, &str)]) -> reqwest::Result<Response> {
        let url = match secret {
            Some(secret) => format!("webhooks/mailchimp?mailchimpwhs={}", secret),
            None => "webhooks/mailchimp".to_string(),
        };
        self.request(Method::POST, &url).form(form).send().await
    }

    pub async fn user_sync(
        &self,
        user_id: UserId,
        credentials: Option<&Credentials>,
    ) -> reqwest::Result<Response> {
        self.authorized_request(Method::POST, &format!("users/{}/sync", user_id), credentials)
            .send()
            .await
    }

    pub async fn user_status(
        &self,
        user_id: UserId,
        credentials: Option<&Credentials>,
    ) -> reqwest::Result<Response> {
        self.authorized_request(Method::GET, &format!("users/{}/status", user_id), credentials)
            .send()
            .await
    }
}
