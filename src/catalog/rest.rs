//! REST catalog client.
//!
//! Talks to a portal's sharing API for items and to the service admin API for
//! composite definitions:
//!
//! | Operation | Endpoint |
//! |---|---|
//! | fetch item | `GET  sharing/rest/content/items/<id>` |
//! | fetch data | `GET  sharing/rest/content/items/<id>/data` |
//! | fetch resources | `GET  sharing/rest/content/items/<id>/resources` |
//! | create item | `POST sharing/rest/content/users/<user>[/<folder>]/addItem` |
//! | create service | `POST sharing/rest/content/users/<user>[/<folder>]/createService` |
//! | update item | `POST sharing/rest/content/users/<user>/items/<id>/update` |
//! | delete item | `POST sharing/rest/content/users/<user>/items/<id>/delete` |
//! | add sub-parts | `POST <admin url>/addToDefinition` |
//! | read sub-part | `GET  <service url>/<partId>` |
//! | update sub-part | `POST <admin url>/<partId>/updateDefinition` |
//!
//! A body containing `error`, a body with `"success": false`, or a non-2xx
//! status is a [`RemoteRequestError`]. Nothing is retried.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{AddPartsResponse, CatalogClient, CreateItemRequest, CreatedItem};
use crate::config::DeployConfig;
use crate::core::{RemoteRequestError, Result, SolutionError};
use crate::models::ResourceRef;

/// Catalog client for a portal's REST API.
#[derive(Debug, Clone)]
pub struct RestCatalog {
    client: Client,
    sharing_url: String,
    username: String,
    token: Option<String>,
}

impl RestCatalog {
    /// Build a client from the deployer configuration.
    ///
    /// Requires `portal_url` and `username`.
    pub fn from_config(config: &DeployConfig) -> Result<Self> {
        let portal = config.require_portal_url()?.trim_end_matches('/');
        let username = config.require_username()?.to_string();
        let client = Client::builder().timeout(config.request_timeout()).build().map_err(|e| {
            SolutionError::Config {
                message: format!("Failed to build HTTP client: {e}"),
            }
        })?;
        Ok(Self {
            client,
            sharing_url: format!("{portal}/sharing/rest"),
            username,
            token: config.token.clone(),
        })
    }

    fn user_content_url(&self, folder: Option<&str>) -> String {
        match folder.filter(|f| !f.is_empty()) {
            Some(folder) => format!("{}/content/users/{}/{folder}", self.sharing_url, self.username),
            None => format!("{}/content/users/{}", self.sharing_url, self.username),
        }
    }

    fn user_item_url(&self, id: &str, action: &str) -> String {
        format!("{}/content/users/{}/items/{id}/{action}", self.sharing_url, self.username)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url).query(&self.auth_params())
    }

    fn post(&self, url: &str, mut form: Vec<(String, String)>) -> RequestBuilder {
        form.extend(self.auth_params());
        self.client.post(url).form(&form)
    }

    fn auth_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("f".to_string(), "json".to_string())];
        if let Some(token) = &self.token {
            params.push(("token".to_string(), token.clone()));
        }
        params
    }

    /// Send a request and apply the uniform failure checks.
    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Value> {
        debug!("Catalog request: {}", operation);
        let response = request
            .send()
            .await
            .map_err(|e| RemoteRequestError::message(operation, e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteRequestError::message(operation, e.to_string()))?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        check_response(operation, status.is_success(), status.as_u16(), body)
    }
}

/// Turn a decoded response into a result.
fn check_response(operation: &str, is_success: bool, status: u16, body: Value) -> Result<Value> {
    if let Some(error) = body.get("error") {
        return Err(RemoteRequestError::new(operation, error.clone()).into());
    }
    if !is_success {
        return Err(RemoteRequestError::new(
            operation,
            json!({"code": status, "message": format!("HTTP {status}"), "details": body}),
        )
        .into());
    }
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(RemoteRequestError::new(operation, body).into());
    }
    Ok(body)
}

/// Admin endpoint of a service url.
///
/// `.../rest/services/Name/FeatureServer` becomes
/// `.../rest/admin/services/Name/FeatureServer`.
pub fn admin_url(service_url: &str) -> String {
    let trimmed = service_url.trim_end_matches('/');
    if trimmed.contains("/rest/admin/services/") {
        trimmed.to_string()
    } else {
        trimmed.replacen("/rest/services/", "/rest/admin/services/", 1)
    }
}

/// Encode an item document as form fields.
///
/// Strings go as is, string arrays (`tags`, `typeKeywords`) comma separated,
/// everything else as JSON. `null`s and the source `id` are dropped.
pub fn form_fields(doc: &Value) -> Vec<(String, String)> {
    let Some(map) = doc.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter(|(key, value)| key.as_str() != "id" && !value.is_null())
        .map(|(key, value)| (key.clone(), form_value(value)))
        .collect()
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) if items.iter().all(Value::is_string) => {
            items.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(",")
        }
        other => other.to_string(),
    }
}

/// Split sub-parts into the `layers` and `tables` lists of a definition.
fn add_to_definition(parts: &[Value]) -> Value {
    let (tables, layers): (Vec<&Value>, Vec<&Value>) =
        parts.iter().partition(|p| p.get("type").and_then(Value::as_str) == Some("Table"));
    let mut definition = Map::new();
    if !layers.is_empty() {
        definition.insert("layers".to_string(), json!(layers));
    }
    if !tables.is_empty() {
        definition.insert("tables".to_string(), json!(tables));
    }
    Value::Object(definition)
}

#[async_trait]
impl CatalogClient for RestCatalog {
    async fn fetch_item(&self, id: &str) -> Result<Value> {
        let url = format!("{}/content/items/{id}", self.sharing_url);
        self.send("fetchItem", self.get(&url)).await
    }

    async fn fetch_data(&self, id: &str) -> Result<Option<Value>> {
        let url = format!("{}/content/items/{id}/data", self.sharing_url);
        let body = self.send("fetchData", self.get(&url)).await?;
        Ok(match body {
            Value::Null => None,
            Value::Object(ref map) if map.is_empty() => None,
            other => Some(other),
        })
    }

    async fn fetch_resources(&self, id: &str) -> Result<Vec<ResourceRef>> {
        let url = format!("{}/content/items/{id}/resources", self.sharing_url);
        let body = self.send("fetchResources", self.get(&url)).await?;
        let resources = body
            .get("resources")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|r| r.get("resource").and_then(Value::as_str))
                    .map(|path| ResourceRef {
                        path: path.to_string(),
                        filename: path.rsplit('/').next().map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(resources)
    }

    async fn create_item(&self, request: CreateItemRequest<'_>) -> Result<CreatedItem> {
        let base = self.user_content_url(request.folder);
        if let Some(service) = request.service {
            let form = vec![
                ("createParameters".to_string(), service.to_string()),
                ("outputType".to_string(), "featureService".to_string()),
            ];
            let url = format!("{base}/createService");
            let body = self.send("createService", self.post(&url, form)).await?;
            let id = body.get("itemId").and_then(Value::as_str).ok_or_else(|| {
                RemoteRequestError::new(
                    "createService",
                    json!({"message": "response has no itemId", "response": body}),
                )
            })?;
            let mut created = CreatedItem::new(id);
            created.url = body.get("serviceurl").and_then(Value::as_str).map(str::to_string);
            created.name = body.get("name").and_then(Value::as_str).map(str::to_string);
            // title, tags and the rest need a second call
            self.update_item(&created.id, request.item).await?;
            return Ok(created);
        }

        let mut form = form_fields(request.item);
        form.push(("type".to_string(), request.kind.as_str().to_string()));
        let url = format!("{base}/addItem");
        let body = self.send("addItem", self.post(&url, form)).await?;
        let id = body.get("id").and_then(Value::as_str).ok_or_else(|| {
            RemoteRequestError::new(
                "addItem",
                json!({"message": "response has no id", "response": body}),
            )
        })?;
        Ok(CreatedItem::new(id))
    }

    async fn update_item(&self, id: &str, patch: &Value) -> Result<()> {
        let url = self.user_item_url(id, "update");
        self.send("updateItem", self.post(&url, form_fields(patch))).await.map(|_| ())
    }

    async fn delete_item(&self, id: &str) -> Result<()> {
        let url = self.user_item_url(id, "delete");
        self.send("deleteItem", self.post(&url, Vec::new())).await.map(|_| ())
    }

    async fn add_composite_sub_parts(
        &self,
        composite_url: &str,
        parts: &[Value],
    ) -> Result<AddPartsResponse> {
        let url = format!("{}/addToDefinition", admin_url(composite_url));
        let form = vec![("addToDefinition".to_string(), add_to_definition(parts).to_string())];
        let body = self.send("addToDefinition", self.post(&url, form)).await?;
        let assigned_ids = ["layers", "tables"]
            .iter()
            .filter_map(|key| body.get(*key).and_then(Value::as_array))
            .flatten()
            .filter_map(|entry| entry.get("id").and_then(Value::as_i64))
            .collect();
        Ok(AddPartsResponse {
            assigned_ids,
        })
    }

    async fn fetch_composite_part(&self, composite_url: &str, part_id: i64) -> Result<Value> {
        let url = format!("{}/{part_id}", composite_url.trim_end_matches('/'));
        self.send("fetchCompositePart", self.get(&url)).await
    }

    async fn update_composite_part_definition(
        &self,
        composite_url: &str,
        part_id: i64,
        patch: &Value,
    ) -> Result<()> {
        let url = format!("{}/{part_id}/updateDefinition", admin_url(composite_url));
        let form = vec![("updateDefinition".to_string(), patch.to_string())];
        self.send("updateDefinition", self.post(&url, form)).await.map(|_| ())
    }
}
