//! Name to identifier resolution for images, SSH keys, and security groups.
//!
//! Collections are paginated. The resolver walks pages in order until the
//! requested name is found or the collection is exhausted, so resources past
//! the first page resolve as well.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ApiError, expect_status};
use crate::instance::{InstanceSpec, ResolvedInstanceSpec};
use crate::transport::{ApiRequest, Transport};
use crate::types::ResourceId;

/// Page size used when none is configured.
pub const DEFAULT_PER_PAGE: u32 = 50;

/// Largest page size the provider accepts.
pub const MAX_PER_PAGE: u32 = 100;

const MAX_PAGES: u32 = 100;

/// Collections that can be searched by name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResourceKind {
    /// Boot images and snapshots usable as images.
    Image,
    /// Stored public SSH keys.
    SshKey,
    /// Network security groups.
    SecurityGroup,
}

impl ResourceKind {
    /// API path of the collection.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Image => "/compute/v1/images",
            Self::SshKey => "/compute/v1/ssh-keys",
            Self::SecurityGroup => "/compute/v1/security-groups",
        }
    }

    /// Field of the list response holding the entries.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::SshKey => "ssh_keys",
            Self::SecurityGroup => "security_groups",
        }
    }

    const fn operation(self) -> &'static str {
        match self {
            Self::Image => "list images",
            Self::SshKey => "list ssh keys",
            Self::SecurityGroup => "list security groups",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::SshKey => "SSH key",
            Self::SecurityGroup => "security group",
        })
    }
}

/// A `{name, id}` entry of a collection.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct NamedResource {
    /// Human-readable name.
    pub name: String,
    /// Provider identifier.
    pub id: ResourceId,
}

struct Page {
    entries: Vec<NamedResource>,
    total_count: Option<u64>,
}

/// Resolves human-readable names to provider identifiers.
#[derive(Clone, Debug)]
pub struct ResourceResolver<T> {
    transport: T,
    per_page: u32,
}

impl<T: Transport> ResourceResolver<T> {
    /// Creates a resolver using [`DEFAULT_PER_PAGE`].
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            per_page: DEFAULT_PER_PAGE,
        }
    }

    /// Overrides the page size, clamped to `1..=MAX_PER_PAGE`.
    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    /// Returns the page size in use.
    #[must_use]
    pub const fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Fetches every page of `kind` and returns the name to identifier
    /// mapping. When a name appears more than once the last entry wins.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] as soon as any page request fails.
    pub async fn resolve(&self, kind: ResourceKind) -> Result<HashMap<String, ResourceId>, ApiError> {
        let mut mapping = HashMap::new();
        self.walk(kind, |entries| {
            for entry in entries {
                mapping.insert(entry.name, entry.id);
            }
        })
        .await?;
        debug!(%kind, entries = mapping.len(), "resolved collection");
        Ok(mapping)
    }

    /// Looks up a single name. The whole collection is walked so duplicates
    /// resolve to the same entry as [`ResourceResolver::resolve`]: the last
    /// one listed.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnknownName`] when the collection is exhausted
    /// without a match, or the first failing page request's error.
    pub async fn find(&self, kind: ResourceKind, name: &str) -> Result<ResourceId, ApiError> {
        let mut found = None;
        self.walk(kind, |entries| {
            if let Some(entry) = entries.into_iter().rev().find(|entry| entry.name == name) {
                found = Some(entry.id);
            }
        })
        .await?;
        found.ok_or_else(|| ApiError::UnknownName {
            kind,
            name: name.to_owned(),
        })
    }

    /// Looks up several names, preserving their order. An empty list makes no
    /// request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnknownName`] for the first name without a match,
    /// or the first failing page request's error.
    pub async fn find_all(
        &self,
        kind: ResourceKind,
        names: &[String],
    ) -> Result<Vec<ResourceId>, ApiError> {
        match names {
            [] => Ok(Vec::new()),
            [single] => Ok(vec![self.find(kind, single).await?]),
            _ => {
                let mapping = self.resolve(kind).await?;
                names
                    .iter()
                    .map(|name| {
                        mapping
                            .get(name)
                            .cloned()
                            .ok_or_else(|| ApiError::UnknownName {
                                kind,
                                name: name.clone(),
                            })
                    })
                    .collect()
            }
        }
    }

    /// Resolves every name in `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidSpec`] when the specification is invalid,
    /// otherwise the first lookup failure.
    pub async fn resolve_spec(&self, spec: InstanceSpec) -> Result<ResolvedInstanceSpec, ApiError> {
        spec.validate()?;
        let image_id = self.find(ResourceKind::Image, &spec.image_name).await?;
        let ssh_key_ids = self
            .find_all(ResourceKind::SshKey, &spec.ssh_key_names)
            .await?;
        let security_group_ids = self
            .find_all(ResourceKind::SecurityGroup, &spec.security_group_names)
            .await?;

        info!(
            image = %spec.image_name,
            %image_id,
            ssh_keys = ?ssh_key_ids,
            security_groups = ?security_group_ids,
            "resolved instance resources"
        );

        Ok(ResolvedInstanceSpec {
            spec,
            image_id,
            ssh_key_ids,
            security_group_ids,
        })
    }

    async fn walk<F>(&self, kind: ResourceKind, mut visit: F) -> Result<(), ApiError>
    where
        F: FnMut(Vec<NamedResource>),
    {
        let per_page = usize::try_from(self.per_page).unwrap_or(usize::MAX);
        let mut seen: u64 = 0;

        for page in 1..=MAX_PAGES {
            let Page {
                entries,
                total_count,
            } = self.fetch_page(kind, page).await?;
            let count = entries.len();
            seen = seen.saturating_add(u64::try_from(count).unwrap_or(u64::MAX));

            visit(entries);

            let exhausted =
                count < per_page || total_count.is_some_and(|total| seen >= total);
            if exhausted {
                return Ok(());
            }
        }

        warn!(%kind, pages = MAX_PAGES, "stopped paging before the collection was exhausted");
        Ok(())
    }

    async fn fetch_page(&self, kind: ResourceKind, page: u32) -> Result<Page, ApiError> {
        let operation = kind.operation();
        let request = ApiRequest::get(kind.path())
            .query("per_page", self.per_page)
            .query("page", page);
        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|err| ApiError::transport(operation, &err))?;
        expect_status(operation, 200, &response)?;

        let entries = response
            .body
            .get(kind.field())
            .cloned()
            .ok_or_else(|| ApiError::decode(operation, format!("missing `{}`", kind.field())))
            .and_then(|value| {
                serde_json::from_value::<Vec<NamedResource>>(value)
                    .map_err(|err| ApiError::decode(operation, err.to_string()))
            })?;
        let total_count = response.body.get("total_count").and_then(Value::as_u64);

        debug!(%kind, page, entries = entries.len(), ?total_count, "fetched page");
        Ok(Page {
            entries,
            total_count,
        })
    }
}
