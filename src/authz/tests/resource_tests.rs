//! Resource grant integration tests
//!
//! Wildcard precedence, scoped enumeration, idempotent grants and
//! parent -> child access inheritance.

mod common;

use async_trait::async_trait;
use common::{engine_with, User};
use permask_authz::{
    AccessMode, AuthzError, ChildIndex, EngineConfig, GrantMatch, Principal, ResourceDependency,
    ResourceRegistry, ResourceScope,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// Task ids per project, mutable so tests can add children later
#[derive(Default)]
struct TaskIndex {
    by_project: RwLock<HashMap<String, Vec<String>>>,
}

impl TaskIndex {
    fn add(&self, project: &str, task: &str) {
        self.by_project
            .write()
            .unwrap()
            .entry(project.to_string())
            .or_default()
            .push(task.to_string());
    }
}

#[async_trait]
impl ChildIndex for TaskIndex {
    async fn children_of(&self, parent_id: &str) -> permask_authz::Result<Vec<String>> {
        Ok(self
            .by_project
            .read()
            .unwrap()
            .get(parent_id)
            .cloned()
            .unwrap_or_default())
    }
}

fn ids(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

async fn setup() -> (permask_authz::PermissionEngine, Arc<TaskIndex>) {
    let index = Arc::new(TaskIndex::default());
    index.add("p1", "t1");
    index.add("p1", "t2");
    index.add("p2", "t9");

    let mut registry = ResourceRegistry::new();
    registry.register("posts").unwrap();
    registry.register("projects").unwrap();
    registry
        .register_dependency(ResourceDependency::new("tasks", "projects", "project_id").map_action("view", "read"))
        .unwrap();
    registry.set_child_index("tasks", index.clone()).unwrap();

    (engine_with(EngineConfig::default(), registry).await, index)
}

// ============================================================================
// WILDCARDS
// ============================================================================

#[tokio::test]
async fn test_full_wildcard_covers_future_instances() {
    let (engine, _) = setup().await;
    let alice = User::new("alice");

    engine.grant(&alice, "posts.*").await.unwrap();

    for action in ["view", "edit", "delete", "publish"] {
        for id in ["1", "2", "created-later-9000"] {
            assert!(
                engine.user_can(&alice, "posts", action, id).await.unwrap(),
                "posts.{}.{}",
                action,
                id
            );
        }
    }
    assert!(!engine.user_can(&alice, "projects", "read", "p1").await.unwrap());
}

#[tokio::test]
async fn test_category_wildcard_is_action_bound() {
    let (engine, _) = setup().await;
    let bob = User::new("bob");

    engine.grant(&bob, "posts.edit").await.unwrap();

    assert!(engine.user_can(&bob, "posts", "edit", "77").await.unwrap());
    assert!(!engine.user_can(&bob, "posts", "delete", "77").await.unwrap());
    assert_eq!(
        engine
            .resources()
            .explain(&bob.entity(), "posts", "edit", "77")
            .await
            .unwrap(),
        Some(GrantMatch::Category)
    );
}

#[tokio::test]
async fn test_scopes() {
    let (engine, _) = setup().await;
    let carol = User::new("carol");
    let resources = engine.resources();

    // no grants never means "all"
    assert_eq!(
        resources.viewable(&carol.entity(), "posts").await.unwrap(),
        ResourceScope::Only(BTreeSet::new())
    );

    engine.grant(&carol, "posts.view.3").await.unwrap();
    engine.grant(&carol, "posts.edit.4").await.unwrap();
    assert_eq!(
        resources.viewable(&carol.entity(), "posts").await.unwrap(),
        ResourceScope::Only(ids(&["3"]))
    );
    assert_eq!(
        resources.editable(&carol.entity(), "posts").await.unwrap(),
        ResourceScope::Only(ids(&["4"]))
    );

    engine.grant(&carol, "posts.*").await.unwrap();
    assert_eq!(
        resources.deletable(&carol.entity(), "posts").await.unwrap(),
        ResourceScope::All
    );
}

#[tokio::test]
async fn test_grant_is_idempotent() {
    let (engine, _) = setup().await;
    let dave = User::new("dave");

    assert!(engine.grant(&dave, "posts.view.1").await.unwrap());
    let once = engine.store().attached(&dave.entity(), "action").await.unwrap();

    assert!(!engine.grant(&dave, "posts.view.1").await.unwrap());
    let twice = engine.store().attached(&dave.entity(), "action").await.unwrap();

    assert_eq!(once, twice);
    assert_eq!(engine.store().list_actions().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_undeclared_resource_type() {
    let (engine, _) = setup().await;
    let erin = User::new("erin");

    assert!(matches!(
        engine.user_can(&erin, "invoices", "view", "1").await,
        Err(AuthzError::MissingCapability(_))
    ));
    assert!(matches!(
        engine.grant(&erin, "invoices.view.1").await,
        Err(AuthzError::MissingCapability(_))
    ));
}

// ============================================================================
// DEPENDENCY INHERITANCE
// ============================================================================

#[tokio::test]
async fn test_parent_grant_inherits_and_selected_restores() {
    let (engine, index) = setup().await;
    let resources = engine.resources();
    let frank = User::new("frank");
    let principal = frank.entity();

    engine.grant(&frank, "tasks.view.t1").await.unwrap();
    engine.grant(&frank, "posts.view.5").await.unwrap();

    let before = resources
        .get_access(&principal, "projects", "p1", "tasks", "view")
        .await
        .unwrap();
    assert_eq!(before.mode, AccessMode::Selected);
    assert_eq!(before.child_ids, ids(&["t1"]));

    // inherit: parent grant uses the mapped action
    resources
        .set_access(&principal, "projects", "p1", "tasks", "view", AccessMode::All, &[])
        .await
        .unwrap();
    assert!(engine.user_can(&frank, "projects", "read", "p1").await.unwrap());
    assert!(!engine.user_can(&frank, "tasks", "view", "t1").await.unwrap());

    index.add("p1", "t3");
    let inherited = resources
        .get_access(&principal, "projects", "p1", "tasks", "view")
        .await
        .unwrap();
    assert_eq!(inherited.mode, AccessMode::All);

    // back to exact scoping
    resources
        .set_access(
            &principal,
            "projects",
            "p1",
            "tasks",
            "view",
            AccessMode::Selected,
            &["t1".to_string()],
        )
        .await
        .unwrap();
    let after = resources
        .get_access(&principal, "projects", "p1", "tasks", "view")
        .await
        .unwrap();
    assert_eq!(after, before);
    assert!(!engine.user_can(&frank, "projects", "read", "p1").await.unwrap());

    // unrelated resource types are untouched
    assert!(engine.user_can(&frank, "posts", "view", "5").await.unwrap());
}

#[tokio::test]
async fn test_child_index_limits_sync_to_one_parent() {
    let (engine, _) = setup().await;
    let resources = engine.resources();
    let gina = User::new("gina");
    let principal = gina.entity();

    engine.grant(&gina, "tasks.view.t9").await.unwrap();
    resources
        .set_access(
            &principal,
            "projects",
            "p1",
            "tasks",
            "view",
            AccessMode::Selected,
            &["t2".to_string()],
        )
        .await
        .unwrap();

    // t9 belongs to p2 and survives the p1 sync
    assert!(engine.user_can(&gina, "tasks", "view", "t9").await.unwrap());
    assert!(engine.user_can(&gina, "tasks", "view", "t2").await.unwrap());

    let p2 = resources
        .get_access(&principal, "projects", "p2", "tasks", "view")
        .await
        .unwrap();
    assert_eq!(p2.child_ids, ids(&["t9"]));
}
