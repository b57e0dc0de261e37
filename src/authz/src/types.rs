//! Core permission types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bitmask::BitPosition;

/// Entity type tag for actions
pub const ACTION_TYPE: &str = "action";

/// Entity type tag for roles
pub const ROLE_TYPE: &str = "role";

/// Entity type tag for groups
pub const GROUP_TYPE: &str = "group";

/// Reference to anything that can own a bitmask or hold assignments
///
/// Actions, roles and groups are addressed by their slug; principals by
/// their concrete type and id (e.g. `user` / `42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity type tag (`action`, `role`, `group`, or a principal type)
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Entity identifier
    pub id: String,
}

impl EntityRef {
    /// Create a new entity reference
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Reference to an action by slug
    pub fn action(slug: impl Into<String>) -> Self {
        Self::new(ACTION_TYPE, slug)
    }

    /// Reference to a role by slug
    pub fn role(slug: impl Into<String>) -> Self {
        Self::new(ROLE_TYPE, slug)
    }

    /// Reference to a group by slug
    pub fn group(slug: impl Into<String>) -> Self {
        Self::new(GROUP_TYPE, slug)
    }

    /// Whether this refers to a role or group (an intermediate holder)
    pub fn is_container(&self) -> bool {
        self.entity_type == ROLE_TYPE || self.entity_type == GROUP_TYPE
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// Persisted action row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Store-assigned identifier
    pub id: u64,

    /// Unique slug (`users.view`, `posts.edit.42`, ...)
    pub slug: String,

    /// Allocated bit, `None` for relational-only actions
    pub bit_position: Option<BitPosition>,

    /// Bit this action held before it left the config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retired_position: Option<BitPosition>,

    /// Human readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ActionRecord {
    /// Whether this action can only be matched by exact relational lookup
    pub fn is_relational_only(&self) -> bool {
        self.bit_position.is_none()
    }

    /// Entity reference for this action
    pub fn entity(&self) -> EntityRef {
        EntityRef::action(&self.slug)
    }
}

/// Persisted role row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    /// Store-assigned identifier
    pub id: u64,

    /// Unique slug
    pub slug: String,
}

impl RoleRecord {
    /// Entity reference for this role
    pub fn entity(&self) -> EntityRef {
        EntityRef::role(&self.slug)
    }
}

/// Persisted group row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Store-assigned identifier
    pub id: u64,

    /// Unique slug
    pub slug: String,
}

impl GroupRecord {
    /// Entity reference for this group
    pub fn entity(&self) -> EntityRef {
        EntityRef::group(&self.slug)
    }
}

/// One set bit of a sparsely stored bitmask
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SparseBit {
    /// Owner type tag
    pub owner_type: String,

    /// Owner identifier
    pub owner_id: String,

    /// Set bit
    pub bit_position: BitPosition,
}

/// Anything that can hold permission grants
///
/// Implementors declare the identity facts the superadmin chain inspects and
/// may expose named boolean predicates. An unknown predicate name is an
/// error, never a silent `false`.
pub trait Principal: Send + Sync {
    /// Concrete principal type (`user`, `service`, ...)
    fn principal_type(&self) -> &str;

    /// Principal identifier, unique within its type
    fn principal_id(&self) -> String;

    /// Email address, if the principal has one
    fn email(&self) -> Option<&str> {
        None
    }

    /// Username, if the principal has one
    fn username(&self) -> Option<&str> {
        None
    }

    /// Evaluates a named zero-argument predicate
    fn call_predicate(&self, name: &str) -> anyhow::Result<bool> {
        anyhow::bail!(
            "principal type '{}' does not declare predicate '{}'",
            self.principal_type(),
            name
        )
    }

    /// Entity reference used for assignments and caching
    fn entity(&self) -> EntityRef {
        EntityRef::new(self.principal_type(), self.principal_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bot;

    impl Principal for Bot {
        fn principal_type(&self) -> &str {
            "bot"
        }

        fn principal_id(&self) -> String {
            "7".to_string()
        }
    }

    #[test]
    fn test_entity_refs() {
        assert_eq!(EntityRef::role("editor").to_string(), "role:editor");
        assert!(EntityRef::group("staff").is_container());
        assert!(!EntityRef::action("users.view").is_container());
        assert_eq!(Bot.entity(), EntityRef::new("bot", "7"));
    }

    #[test]
    fn test_undeclared_predicate_is_error() {
        let err = Bot.call_predicate("is_root").unwrap_err();
        assert!(err.to_string().contains("is_root"));
        assert!(Bot.email().is_none());
    }

    #[test]
    fn test_relational_only_action() {
        let record = ActionRecord {
            id: 1,
            slug: "posts.edit.42".to_string(),
            bit_position: None,
            retired_position: None,
            description: None,
        };
        assert!(record.is_relational_only());
        assert_eq!(record.entity(), EntityRef::action("posts.edit.42"));
    }
}
