//! Declared resource types and their dependencies

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::slug::validate_segment;
use crate::error::{AuthzError, Result};

/// A domain object that can be the target of resource grants
pub trait PermissionResource: Send + Sync {
    /// Resource type key, e.g. `posts`
    fn resource_key(&self) -> &str;

    /// Instance identifier
    fn resource_id(&self) -> String;
}

/// Lists the children of one parent instance
///
/// Without an index, dependency sync considers every direct grant of the
/// child type, regardless of which parent the child belongs to.
#[async_trait]
pub trait ChildIndex: Send + Sync {
    /// Ids of the children whose foreign key points at `parent_id`
    async fn children_of(&self, parent_id: &str) -> Result<Vec<String>>;
}

/// Child resource inheriting access from a parent resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDependency {
    /// Child resource type key
    pub child_key: String,

    /// Parent resource type key
    pub parent_key: String,

    /// Column on the child that references the parent
    pub foreign_key: String,

    /// Child action -> parent action; unmapped actions map to themselves
    #[serde(default)]
    pub action_map: IndexMap<String, String>,
}

impl ResourceDependency {
    /// Create a dependency with an identity action map
    pub fn new(
        child_key: impl Into<String>,
        parent_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            child_key: child_key.into(),
            parent_key: parent_key.into(),
            foreign_key: foreign_key.into(),
            action_map: IndexMap::new(),
        }
    }

    /// Maps a child action onto a different parent action
    pub fn map_action(mut self, child_action: impl Into<String>, parent_action: impl Into<String>) -> Self {
        self.action_map.insert(child_action.into(), parent_action.into());
        self
    }

    /// Parent action that implies `child_action`
    pub fn parent_action<'a>(&'a self, child_action: &'a str) -> &'a str {
        self.action_map
            .get(child_action)
            .map(String::as_str)
            .unwrap_or(child_action)
    }
}

/// One registered resource type
#[derive(Clone, Default)]
pub struct ResourceDefinition {
    dependency: Option<ResourceDependency>,
    child_index: Option<Arc<dyn ChildIndex>>,
}

impl ResourceDefinition {
    /// Parent dependency, if declared
    pub fn dependency(&self) -> Option<&ResourceDependency> {
        self.dependency.as_ref()
    }

    /// Child index, if declared
    pub fn child_index(&self) -> Option<&Arc<dyn ChildIndex>> {
        self.child_index.as_ref()
    }
}

impl fmt::Debug for ResourceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDefinition")
            .field("dependency", &self.dependency)
            .field("child_index", &self.child_index.is_some())
            .finish()
    }
}

/// Resource types that may carry grants
///
/// Every check names its resource key up front; an undeclared key is a
/// composition error and surfaces as [`AuthzError::MissingCapability`].
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    types: IndexMap<String, ResourceDefinition>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a resource type; declaring twice is a no-op
    pub fn register(&mut self, key: &str) -> Result<()> {
        validate_segment("resource key", key)?;
        if !self.types.contains_key(key) {
            self.types.insert(key.to_string(), ResourceDefinition::default());
            debug!("Registered resource type '{}'", key);
        }
        Ok(())
    }

    /// Declares the child type of a dependency and links it to its parent
    ///
    /// # Errors
    ///
    /// - `MissingCapability` if the parent type is not declared
    /// - `CircularDependency` if the link closes a cycle
    /// - `InvalidInput` if the child already has a different parent
    pub fn register_dependency(&mut self, dependency: ResourceDependency) -> Result<()> {
        self.require(&dependency.parent_key)?;
        for action in dependency.action_map.keys().chain(dependency.action_map.values()) {
            validate_segment("resource action", action)?;
        }

        if let Some(existing) = self
            .types
            .get(&dependency.child_key)
            .and_then(ResourceDefinition::dependency)
        {
            if existing.parent_key != dependency.parent_key {
                return Err(AuthzError::InvalidInput(format!(
                    "Resource '{}' already depends on '{}'",
                    dependency.child_key, existing.parent_key
                )));
            }
        }

        self.check_cycle(&dependency)?;

        self.register(&dependency.child_key)?;
        if let Some(definition) = self.types.get_mut(&dependency.child_key) {
            debug!(
                "Resource '{}' inherits from '{}' via '{}'",
                dependency.child_key, dependency.parent_key, dependency.foreign_key
            );
            definition.dependency = Some(dependency);
        }
        Ok(())
    }

    /// Attaches a child index to a dependent type
    pub fn set_child_index(&mut self, child_key: &str, index: Arc<dyn ChildIndex>) -> Result<()> {
        self.dependency_of(child_key)?;
        if let Some(definition) = self.types.get_mut(child_key) {
            definition.child_index = Some(index);
        }
        Ok(())
    }

    /// Definition of a declared type
    pub fn require(&self, key: &str) -> Result<&ResourceDefinition> {
        self.types.get(key).ok_or_else(|| {
            AuthzError::MissingCapability(format!("'{}' is not a registered resource type", key))
        })
    }

    /// Dependency of a declared child type
    pub fn dependency_of(&self, child_key: &str) -> Result<&ResourceDependency> {
        self.require(child_key)?.dependency().ok_or_else(|| {
            AuthzError::MissingCapability(format!("resource '{}' declares no parent dependency", child_key))
        })
    }

    /// Whether a type is declared
    pub fn contains(&self, key: &str) -> bool {
        self.types.contains_key(key)
    }

    /// Declared keys in registration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Follows parent links from the new edge's parent; reaching the child
    /// again means the edge closes a cycle
    fn check_cycle(&self, dependency: &ResourceDependency) -> Result<()> {
        let parents: HashMap<&str, &str> = self
            .types
            .iter()
            .filter_map(|(key, definition)| {
                definition
                    .dependency()
                    .map(|dep| (key.as_str(), dep.parent_key.as_str()))
            })
            .collect();

        let mut path = vec![dependency.child_key.as_str()];
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = dependency.parent_key.as_str();

        loop {
            path.push(current);
            if current == dependency.child_key {
                return Err(AuthzError::CircularDependency(path.join(" -> ")));
            }
            if !seen.insert(current) {
                return Ok(());
            }
            match parents.get(current) {
                Some(parent) => current = parent,
                None => return Ok(()),
            }
        }
    }
}
