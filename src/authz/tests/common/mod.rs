//! Shared fixtures for integration tests

#![allow(dead_code)]

use permask_authz::{
    ActionConfig, EngineConfig, InMemoryPermissionStore, PermissionEngine, Principal, ResourceRegistry,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber once; `RUST_LOG=debug` shows engine logs
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Minimal user principal
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub staff: bool,
}

impl User {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            email: None,
            username: None,
            staff: false,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

impl Principal for User {
    fn principal_type(&self) -> &str {
        "user"
    }

    fn principal_id(&self) -> String {
        self.id.clone()
    }

    fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn call_predicate(&self, name: &str) -> anyhow::Result<bool> {
        match name {
            "is_staff" => Ok(self.staff),
            other => anyhow::bail!("user does not declare '{}'", other),
        }
    }
}

/// `users.view`=0, `users.create`=1, `posts.view`=2
pub fn scenario_actions() -> ActionConfig {
    ActionConfig::new()
        .with_category("users", ["view", "create"])
        .with_category("posts", ["view"])
}

/// Engine over a fresh in-memory store with the scenario actions allocated
pub async fn engine_with(config: EngineConfig, registry: ResourceRegistry) -> PermissionEngine {
    init_tracing();
    let engine = PermissionEngine::new(config, Arc::new(InMemoryPermissionStore::new()), registry)
        .await
        .expect("engine should build");
    engine
        .rebuild_allocation(scenario_actions())
        .await
        .expect("allocation should succeed");
    engine
}

/// Engine with default configuration and a `posts` resource type
pub async fn engine() -> PermissionEngine {
    let mut registry = ResourceRegistry::new();
    registry.register("posts").expect("valid key");
    engine_with(EngineConfig::default(), registry).await
}
