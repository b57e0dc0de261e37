//! Instance-scoped resource grants
//!
//! Resource grants live in their own string namespace,
//! `{resourceKey}.{action}.{resourceId}`, and are never allocated a bit.
//! Checks resolve by exact slug presence with two wildcard forms:
//!
//! - `posts.edit` grants `edit` on every post
//! - `posts.*` grants every action on every post
//!
//! Child types may inherit access from a parent type through a
//! [`ResourceDependency`].

mod registry;
mod resolver;
mod slug;

pub use registry::{ChildIndex, PermissionResource, ResourceDefinition, ResourceDependency, ResourceRegistry};
pub use resolver::{AccessMode, ChildAccess, ResourceResolver, ResourceScope};
pub use slug::{GrantMatch, ResourceSlug, WILDCARD};
