//! Mock catalog client for testing.
//!
//! Records every call, hands out predictable ids (`new-0`, `new-1`, ...) and
//! service urls, stores sub-parts so they can be read back, and can be told to
//! fail a specific call.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{AddPartsResponse, CatalogClient, CreateItemRequest, CreatedItem};
use crate::core::{RemoteRequestError, Result};
use crate::models::ResourceRef;

/// Captured call information for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedCall {
    /// Operation name (`createItem`, `addToDefinition`, ...).
    pub method: String,
    /// Item id or composite url the call targeted.
    pub target: String,
    /// Request payload.
    pub payload: Value,
}

/// Failure to inject.
#[derive(Debug, Clone)]
struct InjectedFailure {
    method: String,
    /// 1-based occurrence of `method` that fails.
    nth: usize,
    error: Value,
}

/// Mock catalog client for testing.
#[derive(Clone, Default)]
pub struct MockCatalog {
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Items "in the catalog" by id: (item, data).
    items: Arc<RwLock<HashMap<String, (Value, Option<Value>)>>>,
    /// Sub-parts by composite url.
    parts: Arc<RwLock<HashMap<String, Vec<Value>>>>,
    /// Ids to hand out.
    next_id: Arc<AtomicUsize>,
    /// Failures to simulate.
    failures: Arc<RwLock<Vec<InjectedFailure>>>,
    /// Lower-case every field name stored by `addToDefinition`.
    lowercase_fields: Arc<RwLock<bool>>,
    /// Number parts from this id on instead of keeping their local ids.
    renumber_from: Arc<RwLock<Option<i64>>>,
    /// Answer `addToDefinition` without any assigned id.
    omit_assigned_ids: Arc<RwLock<bool>>,
    /// Create services without reporting their url.
    omit_service_urls: Arc<RwLock<bool>>,
}

impl MockCatalog {
    /// Create a new mock catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an item so it can be fetched.
    pub fn with_item(self, id: impl Into<String>, item: Value, data: Option<Value>) -> Self {
        self.items.write().insert(id.into(), (item, data));
        self
    }

    /// Make the `nth` (1-based) call to `method` fail with `error`.
    pub fn fail_on(self, method: impl Into<String>, nth: usize, error: Value) -> Self {
        self.failures.write().push(InjectedFailure {
            method: method.into(),
            nth,
            error,
        });
        self
    }

    /// Store sub-part fields lower-cased, like a backend that folds field names.
    pub fn lowercase_fields(self) -> Self {
        *self.lowercase_fields.write() = true;
        self
    }

    /// Assign sub-part ids `first`, `first + 1`, ... in submission order,
    /// like a backend that does not keep the submitted ids.
    pub fn renumber_parts_from(self, first: i64) -> Self {
        *self.renumber_from.write() = Some(first);
        self
    }

    /// Accept sub-parts but report no assigned ids.
    pub fn without_assigned_ids(self) -> Self {
        *self.omit_assigned_ids.write() = true;
        self
    }

    /// Create services but leave their url out of the response.
    pub fn without_service_urls(self) -> Self {
        *self.omit_service_urls.write() = true;
        self
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get calls to a specific method.
    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls.read().iter().filter(|c| c.method == method).cloned().collect()
    }

    /// Check if a specific method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Current item document of a created or seeded item.
    pub fn item(&self, id: &str) -> Option<Value> {
        self.items.read().get(id).map(|(item, _)| item.clone())
    }

    /// Current data document of an item.
    pub fn data(&self, id: &str) -> Option<Value> {
        self.items.read().get(id).and_then(|(_, data)| data.clone())
    }

    /// Whether an item exists.
    pub fn contains_item(&self, id: &str) -> bool {
        self.items.read().contains_key(id)
    }

    /// Sub-parts stored for a composite url.
    pub fn parts(&self, composite_url: &str) -> Vec<Value> {
        self.parts.read().get(composite_url).cloned().unwrap_or_default()
    }

    /// Record a call and apply injected failures.
    fn record_call(&self, method: &str, target: &str, payload: Value) -> Result<()> {
        let occurrence = {
            let mut calls = self.captured_calls.write();
            calls.push(CapturedCall {
                method: method.to_string(),
                target: target.to_string(),
                payload,
            });
            calls.iter().filter(|c| c.method == method).count()
        };
        let failure = self
            .failures
            .read()
            .iter()
            .find(|f| f.method == method && f.nth == occurrence)
            .cloned();
        match failure {
            Some(f) => Err(RemoteRequestError::new(method, f.error).into()),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> String {
        format!("new-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

fn lowercase_field_names(part: &mut Value) {
    let Some(Value::Array(fields)) = part.get_mut("fields") else {
        return;
    };
    for field in fields.iter_mut() {
        if let Some(Value::String(name)) = field.get_mut("name") {
            *name = name.to_lowercase();
        }
    }
}

fn merge_into(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
    }
}

#[async_trait]
impl CatalogClient for MockCatalog {
    async fn fetch_item(&self, id: &str) -> Result<Value> {
        self.record_call("fetchItem", id, Value::Null)?;
        self.item(id).ok_or_else(|| {
            RemoteRequestError::new("fetchItem", json!({"code": 404, "message": "Item does not exist"}))
                .into()
        })
    }

    async fn fetch_data(&self, id: &str) -> Result<Option<Value>> {
        self.record_call("fetchData", id, Value::Null)?;
        Ok(self.data(id))
    }

    async fn fetch_resources(&self, id: &str) -> Result<Vec<ResourceRef>> {
        self.record_call("fetchResources", id, Value::Null)?;
        Ok(Vec::new())
    }

    async fn create_item(&self, request: CreateItemRequest<'_>) -> Result<CreatedItem> {
        let payload = json!({
            "type": request.kind.as_str(),
            "item": request.item,
            "service": request.service,
            "folder": request.folder,
        });
        self.record_call("createItem", "", payload)?;
        let id = self.next_id();
        let mut created = CreatedItem::new(&id);
        if request.service.is_some() {
            let name = request.item.get("name").and_then(Value::as_str).unwrap_or("service");
            created.url = Some(format!("https://mock/rest/services/{name}_{id}/FeatureServer"));
            created.name = Some(format!("{name}_{id}"));
            if let Some(url) = &created.url {
                self.parts.write().insert(url.clone(), Vec::new());
            }
            if *self.omit_service_urls.read() {
                created.url = None;
            }
        }
        self.items.write().insert(id, (request.item.clone(), None));
        Ok(created)
    }

    async fn update_item(&self, id: &str, patch: &Value) -> Result<()> {
        self.record_call("updateItem", id, patch.clone())?;
        let mut items = self.items.write();
        let Some((item, data)) = items.get_mut(id) else {
            return Err(RemoteRequestError::message("updateItem", "Item does not exist").into());
        };
        if let Some(text) = patch.get("text") {
            *data = Some(text.clone());
        }
        let mut rest = patch.clone();
        if let Some(map) = rest.as_object_mut() {
            map.remove("text");
        }
        merge_into(item, &rest);
        Ok(())
    }

    async fn delete_item(&self, id: &str) -> Result<()> {
        self.record_call("deleteItem", id, Value::Null)?;
        self.items.write().remove(id);
        Ok(())
    }

    async fn add_composite_sub_parts(
        &self,
        composite_url: &str,
        parts: &[Value],
    ) -> Result<AddPartsResponse> {
        self.record_call("addToDefinition", composite_url, json!(parts))?;
        let lowercase = *self.lowercase_fields.read();
        let renumber_from = *self.renumber_from.read();
        let mut stored = self.parts.write();
        let existing = stored.entry(composite_url.to_string()).or_default();
        let mut assigned_ids = Vec::with_capacity(parts.len());
        for part in parts {
            let mut part = part.clone();
            if lowercase {
                lowercase_field_names(&mut part);
            }
            let id = match renumber_from {
                Some(first) => first + existing.len() as i64,
                None => part.get("id").and_then(Value::as_i64).unwrap_or(existing.len() as i64),
            };
            if let Some(obj) = part.as_object_mut() {
                obj.insert("id".to_string(), json!(id));
            }
            assigned_ids.push(id);
            existing.push(part);
        }
        if *self.omit_assigned_ids.read() {
            assigned_ids.clear();
        }
        Ok(AddPartsResponse {
            assigned_ids,
        })
    }

    async fn fetch_composite_part(&self, composite_url: &str, part_id: i64) -> Result<Value> {
        self.record_call("fetchCompositePart", composite_url, json!(part_id))?;
        self.parts
            .read()
            .get(composite_url)
            .and_then(|parts| {
                parts.iter().find(|p| p.get("id").and_then(Value::as_i64) == Some(part_id))
            })
            .cloned()
            .ok_or_else(|| {
                RemoteRequestError::new(
                    "fetchCompositePart",
                    json!({"code": 404, "message": format!("Layer {part_id} does not exist")}),
                )
                .into()
            })
    }

    async fn update_composite_part_definition(
        &self,
        composite_url: &str,
        part_id: i64,
        patch: &Value,
    ) -> Result<()> {
        self.record_call(
            "updateDefinition",
            composite_url,
            json!({"id": part_id, "definition": patch}),
        )?;
        let mut stored = self.parts.write();
        let part = stored
            .get_mut(composite_url)
            .and_then(|parts| {
                parts.iter_mut().find(|p| p.get("id").and_then(Value::as_i64) == Some(part_id))
            })
            .ok_or_else(|| RemoteRequestError::message("updateDefinition", "Layer does not exist"))?;
        merge_into(part, patch);
        Ok(())
    }
}
