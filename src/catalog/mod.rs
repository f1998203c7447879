//! Catalog client boundary.
//!
//! Everything the deployer needs from the destination (and source) catalog
//! goes through the [`CatalogClient`] trait. Every method is a suspension
//! point; failures are reported as [`SolutionError::RemoteRequest`] carrying the
//! uniform [`RemoteRequestError`](crate::core::RemoteRequestError) shape.
//! Implementations do not retry.
//!
//! - [`rest::RestCatalog`] talks to a portal's sharing and service admin APIs.
//! - `mock::MockCatalog` records calls and injects failures (tests and the
//!   `test-utils` feature only).
//!
//! [`SolutionError::RemoteRequest`]: crate::core::SolutionError::RemoteRequest

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{ItemKind, Result};
use crate::models::ResourceRef;

/// Identity of a newly created item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedItem {
    /// Id assigned by the catalog.
    pub id: String,
    /// Service url, for items backed by a service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Service name, when the catalog had to make it unique.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CreatedItem {
    /// An item without a service.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
            name: None,
        }
    }

    /// Builder-style helper setting the service url.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Result of adding sub-parts to a composite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPartsResponse {
    /// Ids the backend assigned, in submission order.
    pub assigned_ids: Vec<i64>,
}

/// Request to create an item.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateItemRequest<'a> {
    /// Catalog item type.
    pub kind: &'a ItemKind,
    /// Item description document, placeholders resolved.
    pub item: &'a Value,
    /// Service definition for composite items (no sub-parts).
    pub service: Option<&'a Value>,
    /// Destination folder.
    pub folder: Option<&'a str>,
}

/// Operations the deployer performs against a catalog.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch an item's description document.
    async fn fetch_item(&self, id: &str) -> Result<Value>;

    /// Fetch an item's data document, `None` when it has none.
    async fn fetch_data(&self, id: &str) -> Result<Option<Value>>;

    /// List an item's binary resources.
    async fn fetch_resources(&self, id: &str) -> Result<Vec<ResourceRef>>;

    /// Create an item (or, for composites, an empty service).
    async fn create_item(&self, request: CreateItemRequest<'_>) -> Result<CreatedItem>;

    /// Update an item's description and data.
    async fn update_item(&self, id: &str, patch: &Value) -> Result<()>;

    /// Delete an item.
    async fn delete_item(&self, id: &str) -> Result<()>;

    /// Add sub-parts to a composite.
    ///
    /// The deployer calls this with exactly one part at a time because the
    /// backend does not support concurrent structural changes of one composite.
    async fn add_composite_sub_parts(
        &self,
        composite_url: &str,
        parts: &[Value],
    ) -> Result<AddPartsResponse>;

    /// Read back one sub-part as the backend stored it.
    async fn fetch_composite_part(&self, composite_url: &str, part_id: i64) -> Result<Value>;

    /// Update the definition of one sub-part.
    async fn update_composite_part_definition(
        &self,
        composite_url: &str,
        part_id: i64,
        patch: &Value,
    ) -> Result<()>;
}
