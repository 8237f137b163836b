mod common;

use blueprint_sdk::store::Sort;
use blueprint_sdk::{BlueprintConfig, BlueprintError, RequestContext};
use common::{harness, harness_with};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

async fn seed_users(h: &common::Harness) {
    for name in ["carol", "alice", "bob"] {
        h.create("user", json!({ "name": name })).await;
    }
}

fn names(list: &Value) -> Vec<&str> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn find_filters_sorts_and_records_pagination() {
    let h = harness();
    seed_users(&h).await;

    let mut ctx = RequestContext::for_model("user")
        .with_query("sort", "name ASC")
        .with_query("limit", "2");
    let found = h.blueprint.find(&mut ctx).await.unwrap();
    assert_eq!(ctx.status, 200);
    assert_eq!(names(&found), ["alice", "bob"]);

    let page = ctx.options.pagination.unwrap();
    assert_eq!(page.limit, 2);
    assert_eq!(page.skip, 0);
    assert_eq!(page.sort, Some(Sort::Raw("name ASC".into())));

    let mut ctx = RequestContext::for_model("user").with_query("name", "bob");
    let found = h.blueprint.find(&mut ctx).await.unwrap();
    assert_eq!(names(&found), ["bob"]);

    let mut ctx = RequestContext::for_model("user")
        .with_query("where", r#"{"name":"carol"}"#)
        .with_query("skip", 0);
    let found = h.blueprint.find(&mut ctx).await.unwrap();
    assert_eq!(names(&found), ["carol"]);
}

#[tokio::test]
async fn find_uses_default_limit_and_rejects_malformed_where() {
    let h = harness_with(BlueprintConfig {
        default_limit: 2,
        ..BlueprintConfig::default()
    });
    seed_users(&h).await;

    let mut ctx = RequestContext::for_model("user");
    let found = h.blueprint.find(&mut ctx).await.unwrap();
    assert_eq!(found.as_array().unwrap().len(), 2);

    let mut ctx = RequestContext::for_model("user").with_query("where", "{oops");
    let err = h.blueprint.find(&mut ctx).await.unwrap_err();
    assert!(matches!(err, BlueprintError::InvalidParameter(_)));
    assert_eq!(ctx.status, 400);
}

#[tokio::test]
async fn find_with_primary_key_returns_single_record() {
    let h = harness();
    seed_users(&h).await;

    let mut ctx = RequestContext::for_model("user").with_param("id", "2");
    let found = h.blueprint.find(&mut ctx).await.unwrap();
    assert_eq!(found["name"], "alice");

    let mut ctx = RequestContext::for_model("user").with_param("id", 42);
    h.blueprint.find_one(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 404);

    let mut ctx = RequestContext::for_model("user").with_param("id", "abc");
    h.blueprint.find_one(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 400);

    let mut ctx = RequestContext::for_model("user");
    let err = h.blueprint.find_one(&mut ctx).await.unwrap_err();
    assert!(matches!(err, BlueprintError::MissingPrimaryKey(_)));
}

#[tokio::test]
async fn population_follows_flag_and_allow_list() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;
    h.create("profile", json!({ "bio": "x", "owner": 1 })).await;
    h.create("post", json!({ "title": "t", "author": 1 })).await;

    let mut ctx = RequestContext::for_model("user").with_param("id", 1);
    let full = h.blueprint.find_one(&mut ctx).await.unwrap();
    assert_eq!(full["profile"]["bio"], "x");
    assert_eq!(full["posts"][0]["title"], "t");

    let mut ctx = RequestContext::for_model("user")
        .with_param("id", 1)
        .with_query("populate", "false");
    let bare = h.blueprint.find_one(&mut ctx).await.unwrap();
    assert_eq!(bare["profile"], json!(1));

    let mut ctx = RequestContext::for_model("user")
        .with_param("id", 1)
        .with_query("populate", "[posts]");
    let some = h.blueprint.find_one(&mut ctx).await.unwrap();
    assert_eq!(some["profile"], json!(1));
    assert_eq!(some["posts"][0]["title"], "t");
}

#[tokio::test]
async fn create_requires_existing_targets() {
    let h = harness();

    let mut ctx = RequestContext::for_model("ticket").with_body(json!({ "title": "t", "attachment": 999 }));
    let err = h.blueprint.create(&mut ctx).await.unwrap_err();
    assert!(matches!(err, BlueprintError::Validation(_)));
    assert_eq!(ctx.status, 400);
    assert_eq!(h.store.count("ticket").await, 0);

    let mut ctx = RequestContext::for_model("ticket").with_body(json!({ "title": "t" }));
    h.blueprint.create(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 400);

    let mut ctx = RequestContext::for_model("user").with_body(json!({ "name": "ann", "avatar": 3 }));
    h.blueprint.create(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 400);
    assert_eq!(h.store.count("user").await, 0);

    h.create("image", json!({ "url": "a.png" })).await;
    let ticket = h.create("ticket", json!({ "title": "t", "attachment": { "id": 1, "url": "a.png" } })).await;
    assert_eq!(ticket["attachment"]["url"], "a.png");
    assert_eq!(h.field("ticket", json!(1), "attachment").await, json!(1));
}

#[tokio::test]
async fn create_validates_attributes_and_ignores_reserved_params() {
    let h = harness();

    let mut ctx = RequestContext::for_model("user").with_body(json!({ "limit": 3 }));
    h.blueprint.create(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 400);

    let created = h.create("user", json!({ "name": "ann", "populate": false, "sort": "x" })).await;
    assert_eq!(created["name"], "ann");
    let stored = h.raw("user", json!(1)).await.unwrap();
    assert!(!stored.contains_key("populate"));
    assert!(!stored.contains_key("sort"));
}

#[tokio::test]
async fn update_and_destroy_errors() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;

    let mut ctx = RequestContext::for_model("user").with_body(json!({ "name": "x" }));
    h.blueprint.update(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 400);

    let mut ctx = RequestContext::for_model("user")
        .with_param("id", 8)
        .with_body(json!({ "name": "x" }));
    h.blueprint.update(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 404);

    let mut ctx = RequestContext::for_model("user")
        .with_param("id", 1)
        .with_body(json!({ "name": null }));
    h.blueprint.update(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 400);

    let mut ctx = RequestContext::for_model("user")
        .with_param("id", 1)
        .with_body(json!({ "profile": 5 }));
    h.blueprint.update(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 400);

    let mut ctx = RequestContext::for_model("user").with_param("id", 3);
    h.blueprint.destroy(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 404);

    let mut ctx = RequestContext::for_model("ghost").with_param("id", 1);
    let err = h.blueprint.destroy(&mut ctx).await.unwrap_err();
    assert!(matches!(err, BlueprintError::ModelResolution(_)));
    assert_eq!(ctx.status, 500);
}

#[tokio::test]
async fn update_uses_where_id_from_body() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;

    let mut ctx = RequestContext::for_model("user").with_body(json!({ "where": { "id": 1 }, "name": "anna" }));
    let updated = h.blueprint.update(&mut ctx).await.unwrap();
    assert_eq!(updated["name"], "anna");
    assert_eq!(ctx.status, 200);
}

#[tokio::test]
async fn missing_relation_targets_are_rejected_before_any_write() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;

    let cases = [
        ("user", json!({ "name": "a", "avatar": 999 })),
        ("user", json!({ "name": "b", "profile": 999 })),
        ("post", json!({ "title": "t", "author": 999 })),
        ("user", json!({ "name": "c", "posts": [999] })),
        ("user", json!({ "name": "d", "groups": [999] })),
    ];
    for (model, body) in cases {
        let mut ctx = RequestContext::for_model(model).with_body(body.clone());
        let err = h.blueprint.create(&mut ctx).await.unwrap_err();
        assert!(matches!(err, BlueprintError::Validation(_)), "{body}: {err:?}");
        assert_eq!(ctx.status, 400, "{body}");
    }
    assert_eq!(h.store.count("user").await, 1);
    assert_eq!(h.store.count("post").await, 0);

    let mut ctx = RequestContext::for_model("user")
        .with_param("id", 1)
        .with_body(json!({ "name": "x", "groups": [999] }));
    h.blueprint.update(&mut ctx).await.unwrap_err();
    assert_eq!(ctx.status, 400);
    let user = h.raw("user", json!(1)).await.unwrap();
    assert_eq!(user["name"], "ann");
    assert!(!user.contains_key("groups"));
}

#[tokio::test]
async fn update_ignores_primary_key_in_payload() {
    let h = harness();
    h.create("user", json!({ "name": "ann" })).await;

    let mut ctx = RequestContext::for_model("user")
        .with_param("id", 1)
        .with_body(json!({ "id": 99, "name": "x" }));
    let updated = h.blueprint.update(&mut ctx).await.unwrap();

    assert_eq!(ctx.status, 200);
    assert_eq!(updated["id"], json!(1));
    assert_eq!(updated["name"], "x");
    assert!(h.raw("user", json!(99)).await.is_none());
    assert_eq!(h.store.count("user").await, 1);
}
