use claims::{assert_err, assert_matches, assert_ok, assert_some};

use mailsync::domain::MemberStatus;
use mailsync::sync::{ListSource, SyncError};

use crate::helpers::{alice, bob, list, TestSync};

#[tokio::test]
async fn config_and_remote_sources_are_independent() {
    let sync = TestSync::new();
    let lists = sync.engine.lists();

    let config: Vec<_> = lists.config().into_keys().collect();
    assert_eq!(vec![list("L1"), list("L2"), list("L3")], config);

    let remote: Vec<_> = lists.remote().await.unwrap().into_keys().collect();
    assert_eq!(vec![list("L1"), list("L2"), list("R9")], remote);
}

#[tokio::test]
async fn merged_lists_are_configured_and_remote() {
    let sync = TestSync::new();
    let lists = sync.engine.lists();

    let config = lists.config();
    let remote = lists.remote().await.unwrap();
    let merged = lists.merged().await.unwrap();

    assert_eq!(
        vec![list("L1"), list("L2")],
        merged.keys().cloned().collect::<Vec<_>>()
    );
    for (id, info) in &merged {
        assert!(remote.contains_key(id));
        assert_eq!(Some(info), config.get(id));
    }
}

#[tokio::test]
async fn failed_enumeration_is_an_error_not_an_empty_map() {
    let sync = TestSync::new();
    sync.remote.fail_enumeration();

    let remote = sync.engine.lists().remote().await;
    assert_matches!(remote, Err(SyncError::RemoteProtocol(_)));
    assert_err!(sync.engine.lists().merged().await);

    let source = "remote".parse::<ListSource>().unwrap();
    assert_err!(sync.engine.lists().resolve(source, None).await);
}

#[tokio::test]
async fn user_source_lists_subscribed_lists_only() {
    let sync = TestSync::new();
    sync.remote.add_member("L2", "alice@example.com", MemberStatus::Subscribed);
    sync.remote.add_member("L1", "alice@example.com", MemberStatus::Unsubscribed);

    let lists = sync
        .engine
        .lists()
        .resolve(ListSource::User, Some(&alice()))
        .await
        .unwrap();

    assert_eq!(vec![list("L2")], lists.into_keys().collect::<Vec<_>>());

    let missing_user = sync.engine.lists().resolve(ListSource::User, None).await;
    assert_matches!(missing_user, Err(SyncError::UserNotFound(_)));
}

#[tokio::test]
async fn suppressed_user_has_no_lists() {
    let sync = TestSync::new();
    sync.remote.add_member("L1", "alice@example.com", MemberStatus::Subscribed);
    sync.users.suppress(1);

    let lists = sync.engine.lists().for_user(&alice()).await.unwrap();

    assert!(lists.is_empty());
    assert!(sync.engine.is_subscribed(&alice(), &list("L1")).await.is_none());
    let member = sync.engine.member(&alice(), &list("L1")).await.unwrap();
    assert_eq!(Some(MemberStatus::Subscribed), member.map(|m| m.status));
}

#[tokio::test]
async fn list_data_finds_by_id_then_name() {
    let sync = TestSync::new();

    let by_id = assert_some!(sync.engine.list_data("L2", ListSource::Config).await.unwrap());
    assert_eq!("Weekly", by_id.name);

    let by_name = assert_some!(sync.engine.list_data("General", ListSource::Merged).await.unwrap());
    assert_eq!(list("L1"), by_name.id);

    let remote_only = sync.engine.list_data("Remote only", ListSource::Merged).await;
    assert_matches!(remote_only, Ok(None));
    let remote = sync.engine.list_data("R9", ListSource::Remote).await;
    assert_matches!(remote, Ok(Some(_)));
}

#[tokio::test]
async fn merge_vars_always_carry_groupings_and_email() {
    let sync = TestSync::new();

    let l1 = sync.engine.merge_vars(&bob(), &list("L1")).await.unwrap();
    assert_eq!(2, l1.groupings().len());
    assert_eq!(Some(&serde_json::json!("bob@x.com")), l1.get("EMAIL"));
    assert_eq!(Some(&serde_json::json!("")), l1.get("FNAME"));

    let l2 = sync.engine.merge_vars(&alice(), &list("L2")).await.unwrap();
    assert!(l2.groupings().is_empty());
    let json = serde_json::to_value(&l2).unwrap();
    assert_eq!(serde_json::json!([]), json["GROUPINGS"]);
}

#[tokio::test]
async fn merge_vars_for_unknown_list_fail() {
    let sync = TestSync::new();

    let result = sync.engine.merge_vars(&alice(), &list("R9")).await;

    assert_matches!(result, Err(SyncError::UnknownList(_)));
}

#[tokio::test]
async fn merge_vars_need_at_least_one_tag() {
    let sync = TestSync::new();

    // L3 is configured with no field map and has no remote merge fields
    let result = sync.engine.merge_vars(&alice(), &list("L3")).await;
    assert_matches!(result, Err(SyncError::NoMergeVars(_)));

    let l2 = assert_ok!(sync.engine.merge_vars(&alice(), &list("L2")).await);
    assert_eq!(Some(&serde_json::json!("Alice")), l2.get("FNAME"));
}
