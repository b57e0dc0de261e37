//! Ordered action configuration tree

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AuthzError, Result};

/// Descriptor of one configured action
///
/// Accepts either a bare description string or an object:
///
/// ```json
/// { "users": { "view": "View users", "create": { "description": "Create users" } } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DescriptorRepr")]
pub struct ActionDescriptor {
    /// Human readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ActionDescriptor {
    /// Descriptor with a description
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptorRepr {
    Text(String),
    Detailed {
        #[serde(default)]
        description: Option<String>,
    },
}

impl From<DescriptorRepr> for ActionDescriptor {
    fn from(repr: DescriptorRepr) -> Self {
        match repr {
            DescriptorRepr::Text(text) if text.is_empty() => Self::default(),
            DescriptorRepr::Text(text) => Self::described(text),
            DescriptorRepr::Detailed { description } => Self { description },
        }
    }
}

/// Category -> key -> descriptor tree, in declaration order
///
/// Declaration order is significant: it determines bit positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionConfig {
    categories: IndexMap<String, IndexMap<String, ActionDescriptor>>,
}

impl ActionConfig {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a category with undescribed keys
    pub fn with_category<I, S>(mut self, category: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.categories.entry(category.into()).or_default();
        for key in keys {
            entry.insert(key.into(), ActionDescriptor::default());
        }
        self
    }

    /// Appends one action with a descriptor
    pub fn with_action(
        mut self,
        category: impl Into<String>,
        key: impl Into<String>,
        descriptor: ActionDescriptor,
    ) -> Self {
        self.categories
            .entry(category.into())
            .or_default()
            .insert(key.into(), descriptor);
        self
    }

    /// Parses and validates a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AuthzError::Configuration(format!("Invalid action config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON configuration, falling back to an empty tree
    ///
    /// A broken action config must not take the application down; it is
    /// logged and every config-derived check simply fails closed.
    pub fn from_json_str_lenient(json: &str) -> Self {
        match Self::from_json_str(json) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using an empty action table", e);
                Self::default()
            }
        }
    }

    /// Checks that every category and key yields an unambiguous slug
    pub fn validate(&self) -> Result<()> {
        for (category, keys) in &self.categories {
            validate_segment("category", category)?;
            for key in keys.keys() {
                validate_segment("action key", key)?;
            }
        }
        Ok(())
    }

    /// Leaves in declaration order: `(category, key, descriptor)`
    pub fn leaves(&self) -> impl Iterator<Item = (&str, &str, &ActionDescriptor)> {
        self.categories.iter().flat_map(|(category, keys)| {
            keys.iter()
                .map(move |(key, descriptor)| (category.as_str(), key.as_str(), descriptor))
        })
    }

    /// Category names in declaration order
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Number of configured actions
    pub fn len(&self) -> usize {
        self.categories.values().map(IndexMap::len).sum()
    }

    /// Whether no actions are configured
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_segment(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(AuthzError::Configuration(format!("Empty {} name", kind)));
    }
    if value.contains('.') || value.contains('*') || value.chars().any(char::is_whitespace) {
        return Err(AuthzError::Configuration(format!(
            "Invalid {} '{}': dots, wildcards and whitespace are not allowed",
            kind, value
        )));
    }
    Ok(())
}
