//! Resource grant slugs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AuthzError, Result};

/// Marker used by the full wildcard, `{key}.*`
pub const WILDCARD: &str = "*";

static SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("segment pattern is a valid regex"));

static INSTANCE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_:-]+$").expect("instance id pattern is a valid regex"));

/// Checks a resource key or action name
pub(crate) fn validate_segment(kind: &str, value: &str) -> Result<()> {
    if SEGMENT.is_match(value) {
        Ok(())
    } else {
        Err(AuthzError::InvalidInput(format!(
            "Invalid {} '{}': expected letters, digits, '_' or '-'",
            kind, value
        )))
    }
}

fn validate_instance_id(value: &str) -> Result<()> {
    if INSTANCE_ID.is_match(value) {
        Ok(())
    } else {
        Err(AuthzError::InvalidInput(format!("Invalid resource id '{}'", value)))
    }
}

/// A resource grant pattern
///
/// | Form | Slug | Grants |
/// |---|---|---|
/// | `Instance` | `posts.edit.42` | one action on one instance |
/// | `Category` | `posts.edit` | one action on every instance |
/// | `Wildcard` | `posts.*` | every action on every instance |
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceSlug {
    /// Exact instance grant
    Instance {
        /// Resource type key
        key: String,
        /// Action name
        action: String,
        /// Instance identifier
        id: String,
    },
    /// Every instance, one action
    Category {
        /// Resource type key
        key: String,
        /// Action name
        action: String,
    },
    /// Every instance, every action
    Wildcard {
        /// Resource type key
        key: String,
    },
}

impl ResourceSlug {
    /// Grant on one instance
    pub fn instance(key: impl Into<String>, action: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let (key, action, id) = (key.into(), action.into(), id.into());
        validate_segment("resource key", &key)?;
        validate_segment("resource action", &action)?;
        validate_instance_id(&id)?;
        Ok(Self::Instance { key, action, id })
    }

    /// Grant on every instance for one action
    pub fn category(key: impl Into<String>, action: impl Into<String>) -> Result<Self> {
        let (key, action) = (key.into(), action.into());
        validate_segment("resource key", &key)?;
        validate_segment("resource action", &action)?;
        Ok(Self::Category { key, action })
    }

    /// Grant on every instance for every action
    pub fn wildcard(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        validate_segment("resource key", &key)?;
        Ok(Self::Wildcard { key })
    }

    /// Parses `key.*`, `key.action` or `key.action.id`
    pub fn parse(slug: &str) -> Result<Self> {
        let mut parts = slug.splitn(3, '.');
        let key = parts.next().unwrap_or_default();
        let action = parts
            .next()
            .ok_or_else(|| AuthzError::InvalidInput(format!("Resource slug '{}' has no action", slug)))?;

        match (action, parts.next()) {
            (WILDCARD, None) => Self::wildcard(key),
            (_, None) => Self::category(key, action),
            (_, Some(id)) => Self::instance(key, action, id),
        }
    }

    /// Resource type key
    pub fn key(&self) -> &str {
        match self {
            Self::Instance { key, .. } | Self::Category { key, .. } | Self::Wildcard { key } => key,
        }
    }

    /// Action name, `None` for the full wildcard
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::Instance { action, .. } | Self::Category { action, .. } => Some(action),
            Self::Wildcard { .. } => None,
        }
    }

    /// Instance id, if this is an instance grant
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            Self::Instance { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Whether this grant covers every instance
    pub fn is_type_wide(&self) -> bool {
        !matches!(self, Self::Instance { .. })
    }

    /// The three slugs that can satisfy a check, in precedence order
    pub(crate) fn candidates(key: &str, action: &str, id: &str) -> [(GrantMatch, String); 3] {
        [
            (GrantMatch::Instance, format!("{}.{}.{}", key, action, id)),
            (GrantMatch::Category, format!("{}.{}", key, action)),
            (GrantMatch::Wildcard, format!("{}.{}", key, WILDCARD)),
        ]
    }

    /// Prefix shared by every instance grant of `key.action`
    pub(crate) fn instance_prefix(key: &str, action: &str) -> String {
        format!("{}.{}.", key, action)
    }
}

impl fmt::Display for ResourceSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance { key, action, id } => write!(f, "{}.{}.{}", key, action, id),
            Self::Category { key, action } => write!(f, "{}.{}", key, action),
            Self::Wildcard { key } => write!(f, "{}.{}", key, WILDCARD),
        }
    }
}

impl FromStr for ResourceSlug {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceSlug {
    type Error = AuthzError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ResourceSlug> for String {
    fn from(slug: ResourceSlug) -> Self {
        slug.to_string()
    }
}

/// Which grant form satisfied a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantMatch {
    /// `key.action.id`
    Instance,
    /// `key.action`
    Category,
    /// `key.*`
    Wildcard,
}
