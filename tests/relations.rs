mod common;

use blueprint_sdk::store::Operation;
use blueprint_sdk::{BlueprintError, RequestContext};
use common::{harness, relation_ctx};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

#[tokio::test]
async fn one_to_one_create_links_both_sides() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    let profile = h.create("profile", json!({ "bio": "hi", "owner": 1 })).await;

    assert_eq!(profile["owner"]["name"], "ann");
    assert_eq!(h.field("user", json!(1), "profile").await, json!(1));
}

#[tokio::test]
async fn reassigning_one_to_one_keeps_pairs_exclusive() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    h.create("user", json!({ "name": "bob" })).await;
    h.create("profile", json!({ "owner": 1 })).await;
    h.create("profile", json!({ "owner": 2 })).await;

    let updated = h.update("user", json!(1), json!({ "profile": 2 })).await;

    assert_eq!(updated["profile"]["id"], json!(2));
    assert_eq!(h.field("profile", json!(2), "owner").await, json!(1));
    assert_eq!(h.field("profile", json!(1), "owner").await, Value::Null);
    assert_eq!(h.field("user", json!(2), "profile").await, Value::Null);
}

#[tokio::test]
async fn clearing_one_to_one_releases_inverse() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    h.create("profile", json!({ "owner": 1 })).await;

    h.update("user", json!(1), json!({ "profile": null })).await;

    assert_eq!(h.field("profile", json!(1), "owner").await, Value::Null);
}

#[tokio::test]
async fn update_without_relation_field_leaves_it_alone() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    h.create("profile", json!({ "owner": 1 })).await;

    let updated = h.update("user", json!(1), json!({ "name": "anna" })).await;

    assert_eq!(updated["name"], "anna");
    assert_eq!(h.field("user", json!(1), "profile").await, json!(1));
    assert_eq!(h.field("profile", json!(1), "owner").await, json!(1));
}

#[tokio::test]
async fn moving_a_post_between_authors_updates_both_lists() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    h.create("user", json!({ "name": "bob" })).await;
    h.create("post", json!({ "title": "t", "author": 1 })).await;
    assert_eq!(h.field("user", json!(1), "posts").await, json!([1]));

    h.update("post", json!(1), json!({ "author": 2 })).await;

    assert_eq!(h.field("user", json!(1), "posts").await, json!([]));
    assert_eq!(h.field("user", json!(2), "posts").await, json!([1]));
}

#[tokio::test]
async fn add_twice_keeps_child_once() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    h.create("group", json!({ "name": "g" })).await;

    for _ in 0..2 {
        let mut ctx = relation_ctx("user", json!(1), "groups").with_param("id", 1);
        let parent = h.blueprint.add(&mut ctx).await.unwrap();
        assert_eq!(ctx.status, 200);
        assert_eq!(parent["groups"].as_array().unwrap().len(), 1);
    }
    assert_eq!(h.field("user", json!(1), "groups").await, json!([1]));
    assert_eq!(h.field("group", json!(1), "members").await, json!([1]));
}

#[tokio::test]
async fn add_creates_missing_child_from_payload() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;

    let mut ctx = relation_ctx("user", json!(1), "posts").with_body(json!({ "title": "fresh" }));
    let parent = h.blueprint.add(&mut ctx).await.unwrap();

    assert_eq!(parent["posts"][0]["title"], "fresh");
    assert_eq!(h.field("post", json!(1), "author").await, json!(1));

    let mut ctx = relation_ctx("user", json!(1), "posts")
        .with_param("id", 7)
        .with_body(json!({ "title": "seven" }));
    h.blueprint.add(&mut ctx).await.unwrap();
    assert_eq!(h.field("post", json!(7), "title").await, json!("seven"));
    assert_eq!(h.field("user", json!(1), "posts").await, json!([1, 7]));
}

#[tokio::test]
async fn add_moves_child_away_from_previous_parent() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    h.create("user", json!({ "name": "bob" })).await;
    h.create("post", json!({ "title": "t", "author": 1 })).await;

    let mut ctx = relation_ctx("user", json!(2), "posts").with_param("id", 1);
    h.blueprint.add(&mut ctx).await.unwrap();

    assert_eq!(h.field("post", json!(1), "author").await, json!(2));
    assert_eq!(h.field("user", json!(1), "posts").await, json!([]));
    assert_eq!(h.field("user", json!(2), "posts").await, json!([1]));
}

#[tokio::test]
async fn add_rejects_bad_requests() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;

    let mut ctx = relation_ctx("user", json!(1), "posts");
    let err = h.blueprint.add(&mut ctx).await.unwrap_err();
    assert!(matches!(err, BlueprintError::MissingChildIdentifier(_)));
    assert_eq!(ctx.status, 400);

    let mut ctx = relation_ctx("user", json!(9), "groups").with_param("id", 1);
    h.blueprint.add(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 404);

    let mut ctx = relation_ctx("user", json!(1), "profile").with_param("id", 1);
    h.blueprint.add(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 404);

    let mut ctx = RequestContext::for_model("user").with_param("parentId", 1).with_param("id", 1);
    let err = h.blueprint.add(&mut ctx).await.unwrap_err();
    assert!(matches!(err, BlueprintError::MissingRouteOption(_)));
    assert_eq!(ctx.status, 500);

    let mut ctx = RequestContext::for_model("user")
        .with_relation("groups")
        .with_param("id", 1);
    let err = h.blueprint.add(&mut ctx).await.unwrap_err();
    assert!(matches!(err, BlueprintError::MissingPrimaryKey(_)));
}

#[tokio::test]
async fn remove_singular_clears_both_sides() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    h.create("profile", json!({ "owner": 1 })).await;

    let mut ctx = relation_ctx("user", json!(1), "profile").with_param("id", 1);
    let parent = h.blueprint.remove(&mut ctx).await.unwrap();

    assert_eq!(ctx.status, 200);
    assert_eq!(parent["profile"], Value::Null);
    assert_eq!(h.field("user", json!(1), "profile").await, Value::Null);
    assert_eq!(h.field("profile", json!(1), "owner").await, Value::Null);
    assert!(h.raw("profile", json!(1)).await.is_some());
}

#[tokio::test]
async fn remove_from_plural_relations() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    h.create("group", json!({ "name": "g", "members": [1] })).await;
    h.create("post", json!({ "title": "t", "author": 1 })).await;
    assert_eq!(h.field("user", json!(1), "groups").await, json!([1]));

    let mut ctx = relation_ctx("user", json!(1), "groups").with_param("id", "1");
    h.blueprint.remove(&mut ctx).await.unwrap();
    assert_eq!(h.field("user", json!(1), "groups").await, json!([]));
    assert_eq!(h.field("group", json!(1), "members").await, json!([]));

    let mut ctx = relation_ctx("user", json!(1), "posts").with_param("id", 1);
    h.blueprint.remove(&mut ctx).await.unwrap();
    assert_eq!(h.field("user", json!(1), "posts").await, json!([]));
    assert_eq!(h.field("post", json!(1), "author").await, Value::Null);

    let mut ctx = relation_ctx("user", json!(1), "groups").with_param("id", 1);
    h.blueprint.remove(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 404);

    let mut ctx = relation_ctx("user", json!(1), "groups");
    let err = h.blueprint.remove(&mut ctx).await.unwrap_err();
    assert!(matches!(err, BlueprintError::MissingChildIdentifier(_)));
    assert_eq!(ctx.status, 400);
}

#[tokio::test]
async fn destroy_clears_every_inbound_pointer() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    h.create("user", json!({ "name": "bob" })).await;
    h.create("profile", json!({ "owner": 1 })).await;
    h.create("post", json!({ "title": "a", "author": 1 })).await;
    h.create("post", json!({ "title": "b", "author": 1 })).await;
    h.create("group", json!({ "name": "g", "members": [1, 2] })).await;

    let mut ctx = RequestContext::for_model("user").with_param("id", 1);
    let deleted = h.blueprint.destroy(&mut ctx).await.unwrap();

    assert_eq!(deleted["name"], "ann");
    assert!(h.raw("user", json!(1)).await.is_none());
    assert_eq!(h.field("profile", json!(1), "owner").await, Value::Null);
    assert_eq!(h.field("post", json!(1), "author").await, Value::Null);
    assert_eq!(h.field("post", json!(2), "author").await, Value::Null);
    assert_eq!(h.field("group", json!(1), "members").await, json!([2]));
}

#[tokio::test]
async fn failed_relation_write_rolls_create_back() {
    let h = harness();
    h.create("profile", json!({ "bio": "spare" })).await;
    h.store.inject_failure("profile", Operation::Update);

    let mut ctx = RequestContext::for_model("user").with_body(json!({ "name": "ann", "profile": 1 }));
    let err = h.blueprint.create(&mut ctx).await.unwrap_err();

    assert!(matches!(err, BlueprintError::InternalStore(_)));
    assert_eq!(ctx.status, 500);
    assert_eq!(h.store.count("user").await, 0);
}

#[tokio::test]
async fn failed_relation_write_rolls_update_back() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    h.create("profile", json!({ "owner": 1 })).await;
    h.create("profile", json!({ "bio": "spare" })).await;
    h.store.inject_failure("profile", Operation::Update);

    let mut ctx = RequestContext::for_model("user")
        .with_param("id", 1)
        .with_body(json!({ "name": "changed", "profile": 2 }));
    h.blueprint.update(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 500);

    h.store.clear_failures();
    let user = h.raw("user", json!(1)).await.unwrap();
    assert_eq!(user["name"], "ann");
    assert_eq!(user["profile"], json!(1));
    assert_eq!(h.field("profile", json!(1), "owner").await, json!(1));
}

#[tokio::test]
async fn destroy_reports_degraded_integrity_with_committed_record() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    h.create("profile", json!({ "owner": 1 })).await;
    h.store.inject_failure("profile", Operation::Update);

    let mut ctx = RequestContext::for_model("user").with_param("id", 1);
    let err = h.blueprint.destroy(&mut ctx).await.unwrap_err();

    assert_eq!(ctx.status, 500);
    assert_eq!(h.store.count("user").await, 0);
    match &err {
        BlueprintError::IntegrityDegraded { committed, source } => {
            assert_eq!(committed["name"], "ann");
            assert!(matches!(**source, BlueprintError::InternalStore(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.to_body()["error"]["details"]["name"], "ann");
}
