//! Bundle deployment.
//!
//! [`deploy_bundle`] recreates every template of a bundle in the destination
//! catalog. Items are created in dependency order, one at a time: each item's
//! placeholders are resolved against the settings of the items deployed before
//! it, the item is created, its own settings are registered, composites are
//! assembled part by part ([`pipeline`]), and a final update pushes the fully
//! resolved documents.
//!
//! # Failure handling
//!
//! A cycle or a dangling dependency id stops the deployment before any backend
//! call. An item failure is reported as [`ProgressStatus::Failed`] and then
//! handled according to the [`FailurePolicy`]:
//!
//! - [`FailurePolicy::Abort`] returns the error; nothing is rolled back.
//! - [`FailurePolicy::Continue`] records the failure, skips every item that
//!   depends on it (directly or through another skipped item) and carries on
//!   with the rest.
//!
//! # Cancellation
//!
//! When the progress listener returns `false` for an item's `done` event, that
//! item is deleted again (best effort), a `cancelled` event is emitted and the
//! deployment stops with [`SolutionError::Cancelled`].

pub mod capture;
pub mod pipeline;
pub mod progress;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::catalog::{CatalogClient, CreateItemRequest, CreatedItem};
use crate::constants::ITEM_CREATION_COST;
use crate::core::{RemoteRequestError, Result, SolutionError};
use crate::models::{Bundle, Template};
use crate::resolver::sequence;
use crate::settings::{ItemSettings, SettingsRegistry};
use crate::templating::composite::PART_COLLECTIONS;
use crate::templating::{DependencySource, Detemplatizer, is_templatized, layer_id};

pub use capture::{capture_template, templatize_bundle, templatize_template};
pub use pipeline::{AssemblyContext, AssemblyOutcome, SideTables, assemble_composite};
pub use progress::{CostTracker, ProgressCallback, ProgressEvent, ProgressReporter, ProgressStatus};

/// What to do with the rest of a bundle when one item fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failure.
    #[default]
    Abort,
    /// Skip the failed item's dependents and deploy everything else.
    Continue,
}

/// Options of one deployment run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Destination folder for created items.
    pub folder: Option<String>,
    /// Failure handling.
    pub failure_policy: FailurePolicy,
}

/// An item created by the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedItem {
    /// Source id.
    pub owner_id: String,
    /// Id of the copy.
    pub new_id: String,
}

/// An item that could not be deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    /// Source id.
    pub owner_id: String,
    /// Error message.
    pub error: String,
}

/// Outcome of a deployment run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    /// Deployment order of the whole bundle.
    pub order: Vec<String>,
    /// Items created, in deployment order.
    pub deployed: Vec<DeployedItem>,
    /// Items that failed.
    pub failed: Vec<FailedItem>,
    /// Items not attempted because a dependency failed.
    pub skipped: Vec<String>,
}

impl DeploymentReport {
    /// Whether every item of the bundle was deployed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Deploy every template of `bundle` in dependency order.
///
/// `registry` receives one entry per created item and may already hold
/// settings of items deployed earlier (and the global settings). `progress`
/// is charged and notified at every milestone.
pub async fn deploy_bundle(
    bundle: &Bundle,
    client: &dyn CatalogClient,
    registry: &mut SettingsRegistry,
    options: &DeployOptions,
    progress: &mut ProgressReporter<'_>,
) -> Result<DeploymentReport> {
    bundle.validate()?;
    let order = sequence(&bundle.templates)?;
    info!("Deploying {} item(s): {}", order.len(), order.join(", "));

    let mut report = DeploymentReport {
        order: order.clone(),
        ..DeploymentReport::default()
    };
    let mut blocked: HashSet<String> = HashSet::new();

    for owner_id in &order {
        let template = bundle.get(owner_id).ok_or_else(|| {
            SolutionError::malformed(owner_id, "sequenced item is missing from the bundle")
        })?;

        if let Some(dep) = template.dependency_ids.iter().find(|d| blocked.contains(*d)) {
            warn!("Skipping {} because dependency {} was not deployed", owner_id, dep);
            blocked.insert(owner_id.clone());
            report.skipped.push(owner_id.clone());
            continue;
        }

        progress.emit(owner_id, ProgressStatus::Started);
        let created = match deploy_item(bundle, template, client, registry, options, progress).await {
            Ok(created) => created,
            Err(error) => {
                warn!("Failed to deploy {}: {}", owner_id, error);
                progress.emit(owner_id, ProgressStatus::Failed);
                match options.failure_policy {
                    FailurePolicy::Abort => return Err(error),
                    FailurePolicy::Continue => {
                        blocked.insert(owner_id.clone());
                        report.failed.push(FailedItem {
                            owner_id: owner_id.clone(),
                            error: error.to_string(),
                        });
                        continue;
                    }
                }
            }
        };

        report.deployed.push(DeployedItem {
            owner_id: owner_id.clone(),
            new_id: created.id.clone(),
        });
        if !progress.emit(owner_id, ProgressStatus::Done) {
            info!("Deployment cancelled after {}; removing {}", owner_id, created.id);
            if let Err(e) = client.delete_item(&created.id).await {
                warn!("Could not remove {}: {}", created.id, e);
            }
            progress.emit(owner_id, ProgressStatus::Cancelled);
            return Err(SolutionError::Cancelled {
                owner_id: owner_id.clone(),
            });
        }
    }

    info!(
        "Deployed {} item(s), {} failed, {} skipped",
        report.deployed.len(),
        report.failed.len(),
        report.skipped.len()
    );
    Ok(report)
}

/// Create one item and bring it to its final state.
async fn deploy_item(
    bundle: &Bundle,
    template: &Template,
    client: &dyn CatalogClient,
    registry: &mut SettingsRegistry,
    options: &DeployOptions,
    progress: &mut ProgressReporter<'_>,
) -> Result<CreatedItem> {
    let owner = template.owner_id.as_str();
    let service = if template.kind.is_composite() {
        Some(service_definition(template)?)
    } else {
        None
    };

    let item_doc = creation_doc(&Detemplatizer::new(registry).resolve_value(&template.base_doc));
    debug!("Creating {} ({})", owner, template.kind);
    let created = client
        .create_item(CreateItemRequest {
            kind: &template.kind,
            item: &item_doc,
            service: service.as_ref(),
            folder: options.folder.as_deref(),
        })
        .await?;

    let mut settings = ItemSettings::new(&created.id);
    settings.new_url = created.url.clone();
    settings.new_name = created.name.clone().or_else(|| template.name().map(str::to_string));
    registry.register(owner, settings)?;
    progress.charge(ITEM_CREATION_COST);
    progress.emit(owner, ProgressStatus::Created);

    let mut resolved_popups = BTreeMap::new();
    if template.kind.is_composite() {
        let Some(url) = created.url.as_deref() else {
            return Err(RemoteRequestError::message(
                "createItem",
                format!("created service {} returned no url", created.id),
            )
            .into());
        };
        let dependencies = dependency_sources(bundle, template);
        let context = AssemblyContext {
            template,
            composite_url: url,
            dependencies: &dependencies,
        };
        resolved_popups = assemble_composite(client, &context, registry, progress).await?.resolved_popups;
    }

    let resolver = Detemplatizer::new(registry);
    let mut patch = resolver.resolve_value(&template.base_doc);
    if let Some(doc) = patch.as_object_mut() {
        doc.remove("id");
    }
    if let (Some(data), false) = (template.data_doc.as_ref(), template.kind.is_group()) {
        let mut data = resolver.resolve_value(data);
        apply_popups(&mut data, &resolved_popups);
        if let Some(doc) = patch.as_object_mut() {
            doc.insert("text".to_string(), data);
        }
    }
    client.update_item(&created.id, &patch).await?;
    progress.emit(owner, ProgressStatus::Updated);
    info!("Deployed {} as {}", owner, created.id);
    Ok(created)
}

/// Service definition of a composite, named after the item.
fn service_definition(template: &Template) -> Result<Value> {
    let owner = template.owner_id.as_str();
    let props = template.extra_props.as_ref().ok_or_else(|| {
        SolutionError::malformed(owner, "composite item has no sub-resource properties recorded")
    })?;
    let mut service = match props.get("service") {
        Some(Value::Object(service)) => service.clone(),
        _ => Map::new(),
    };
    if let Some(name) = template.name() {
        service.insert("name".to_string(), Value::String(name.to_string()));
    }
    Ok(Value::Object(service))
}

/// Item document to create from: the source id is dropped, and so is a url
/// that can only be resolved once the item exists.
fn creation_doc(resolved: &Value) -> Value {
    let mut doc = resolved.clone();
    if let Some(map) = doc.as_object_mut() {
        map.remove("id");
        let unresolved_url =
            map.get("url").and_then(Value::as_str).is_some_and(|url| url.contains("{{"));
        if unresolved_url {
            map.remove("url");
        }
    }
    doc
}

/// Services a composite draws from, with the names its views refer to them by.
fn dependency_sources(bundle: &Bundle, template: &Template) -> Vec<DependencySource> {
    template
        .dependency_ids
        .iter()
        .filter_map(|id| bundle.get(id))
        .filter_map(|dep| Some(DependencySource::new(&dep.owner_id, dep.name()?)))
        .filter(|source| !is_templatized(&source.name))
        .collect()
}

/// Replace the popup configuration of each data-document layer or table.
fn apply_popups(data: &mut Value, popups: &BTreeMap<i64, Value>) {
    if popups.is_empty() {
        return;
    }
    for collection in PART_COLLECTIONS {
        let Some(Value::Array(entries)) = data.get_mut(collection) else {
            continue;
        };
        for entry in entries.iter_mut() {
            let Some(popup) = layer_id(entry).and_then(|id| popups.get(&id)) else {
                continue;
            };
            if let Some(obj) = entry.as_object_mut() {
                obj.insert("popupInfo".to_string(), popup.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mock::MockCatalog;
    use crate::core::ItemKind;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn map_template(id: &str, deps: &[&str]) -> Template {
        Template::new(id, ItemKind::WebMap, json!({"id": id, "title": format!("Map {id}")}))
            .with_dependencies(deps.iter().copied())
    }

    fn recording(events: &Arc<Mutex<Vec<ProgressEvent>>>, stop_at_done_of: Option<&'static str>) -> ProgressCallback<'static> {
        let sink = Arc::clone(events);
        Box::new(move |event: &ProgressEvent| {
            sink.lock().push(event.clone());
            !(event.status == ProgressStatus::Done && Some(event.process_id.as_str()) == stop_at_done_of)
        })
    }

    #[test]
    fn test_failure_policy_default_and_names() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::Abort);
        assert_eq!(serde_json::to_string(&FailurePolicy::Continue).unwrap(), "\"continue\"");
    }

    #[test]
    fn test_creation_doc_drops_unresolvable_url() {
        let doc = creation_doc(&json!({"id": "abc", "url": "{{abc.url}}", "title": "T"}));
        assert_eq!(doc, json!({"title": "T"}));
        let doc = creation_doc(&json!({"url": "https://host/app"}));
        assert_eq!(doc, json!({"url": "https://host/app"}));
    }

    #[test]
    fn test_apply_popups_by_layer_id() {
        let mut data = json!({"layers": [{"id": 0, "popupInfo": {"title": "old"}}, {"id": 1}]});
        let popups = BTreeMap::from([(0, json!({"title": "new"}))]);
        apply_popups(&mut data, &popups);
        assert_eq!(data["layers"][0]["popupInfo"]["title"], "new");
        assert!(data["layers"][1].get("popupInfo").is_none());
    }

    #[tokio::test]
    async fn test_deploys_in_dependency_order() {
        let bundle = Bundle::new(vec![
            map_template("abc", &["ghi", "def"]),
            map_template("def", &[]),
            map_template("ghi", &[]),
        ]);
        let mock = MockCatalog::new();
        let mut registry = SettingsRegistry::new();
        let mut progress = ProgressReporter::silent(bundle.total_cost());

        let report =
            deploy_bundle(&bundle, &mock, &mut registry, &DeployOptions::default(), &mut progress)
                .await
                .unwrap();

        assert_eq!(report.order, vec!["ghi", "def", "abc"]);
        assert!(report.is_complete());
        assert_eq!(registry.get("ghi").unwrap().new_id, "new-0");
        assert_eq!(registry.get("abc").unwrap().new_id, "new-2");
        assert_eq!(mock.get_method_calls("createItem").len(), 3);
        assert_eq!(progress.tracker().used(), 3);
    }

    #[tokio::test]
    async fn test_cycle_fails_before_any_backend_call() {
        let bundle = Bundle::new(vec![
            map_template("abc", &["ghi"]),
            map_template("ghi", &["def"]),
            map_template("def", &["abc"]),
        ]);
        let mock = MockCatalog::new();
        let mut registry = SettingsRegistry::new();
        let mut progress = ProgressReporter::silent(3);
        let err = deploy_bundle(&bundle, &mock, &mut registry, &DeployOptions::default(), &mut progress)
            .await
            .unwrap_err();
        assert!(matches!(err, SolutionError::CyclicDependency));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_continue_policy_skips_dependents() {
        let bundle = Bundle::new(vec![
            map_template("app", &["map"]),
            map_template("map", &["svc"]),
            map_template("svc", &[]),
            map_template("other", &[]),
        ]);
        let mock = MockCatalog::new().fail_on("createItem", 1, json!({"message": "denied"}));
        let mut registry = SettingsRegistry::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut progress = ProgressReporter::new(4, recording(&events, None));
        let options = DeployOptions {
            folder: None,
            failure_policy: FailurePolicy::Continue,
        };

        let report = deploy_bundle(&bundle, &mock, &mut registry, &options, &mut progress).await.unwrap();

        assert_eq!(report.order, vec!["svc", "map", "app", "other"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].owner_id, "svc");
        assert_eq!(report.skipped, vec!["map", "app"]);
        assert_eq!(report.deployed.len(), 1);
        assert_eq!(report.deployed[0].owner_id, "other");

        let events = events.lock();
        assert_eq!(events[0].status, ProgressStatus::Started);
        assert_eq!(events[1].status, ProgressStatus::Failed);
        assert!(events.iter().all(|e| e.process_id != "map"));
    }

    #[tokio::test]
    async fn test_abort_policy_returns_first_error() {
        let bundle = Bundle::new(vec![map_template("a", &[]), map_template("b", &[])]);
        let mock = MockCatalog::new().fail_on("createItem", 1, json!({"message": "denied"}));
        let mut registry = SettingsRegistry::new();
        let mut progress = ProgressReporter::silent(2);
        let err = deploy_bundle(&bundle, &mock, &mut registry, &DeployOptions::default(), &mut progress)
            .await
            .unwrap_err();
        assert!(matches!(err, SolutionError::RemoteRequest(_)));
        assert_eq!(mock.get_method_calls("createItem").len(), 1);
    }

    #[tokio::test]
    async fn test_service_without_url_fails() {
        let service = Template::new("svc", ItemKind::FeatureService, json!({"id": "svc", "name": "Parcels"}))
            .with_properties(json!({"service": {}, "layers": [{"id": 0, "name": "L0", "fields": []}]}));
        let bundle = Bundle::new(vec![service]);
        let mock = MockCatalog::new().without_service_urls();
        let mut registry = SettingsRegistry::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut progress = ProgressReporter::new(bundle.total_cost(), recording(&events, None));

        let err = deploy_bundle(&bundle, &mock, &mut registry, &DeployOptions::default(), &mut progress)
            .await
            .unwrap_err();

        match err {
            SolutionError::RemoteRequest(source) => {
                assert_eq!(source.operation, "createItem");
                assert!(source.error_message().contains("returned no url"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!mock.was_called("addToDefinition"));
        assert!(!mock.was_called("updateItem"));
        assert_eq!(events.lock().last().unwrap().status, ProgressStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_after_done_deletes_item() {
        let bundle = Bundle::new(vec![map_template("a", &[]), map_template("b", &["a"])]);
        let mock = MockCatalog::new();
        let mut registry = SettingsRegistry::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut progress = ProgressReporter::new(2, recording(&events, Some("a")));

        let err = deploy_bundle(&bundle, &mock, &mut registry, &DeployOptions::default(), &mut progress)
            .await
            .unwrap_err();

        assert!(matches!(err, SolutionError::Cancelled { ref owner_id } if owner_id == "a"));
        let deletes = mock.get_method_calls("deleteItem");
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].target, "new-0");
        assert!(!mock.contains_item("new-0"));
        assert_eq!(mock.get_method_calls("createItem").len(), 1);
        let last = events.lock().last().cloned().unwrap();
        assert_eq!(last.status, ProgressStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_map_references_resolve_to_deployed_service() {
        let service = Template::new(
            "svc",
            ItemKind::FeatureService,
            json!({"id": "svc", "name": "Parcels", "url": "{{svc.url}}"}),
        )
        .with_properties(json!({"service": {"capabilities": "Query"}, "layers": [{"id": 0, "name": "P", "fields": [{"name": "OWNER"}]}]}));
        let map = Template::new("map", ItemKind::WebMap, json!({"id": "map", "title": "Map"}))
            .with_dependencies(["svc"])
            .with_data(json!({"operationalLayers": [{"itemId": "{{svc.id}}", "url": "{{svc.layer0.url}}"}]}));
        let bundle = Bundle::new(vec![map, service]);
        let mock = MockCatalog::new();
        let mut registry = SettingsRegistry::new();
        let mut progress = ProgressReporter::silent(bundle.total_cost());

        deploy_bundle(&bundle, &mock, &mut registry, &DeployOptions::default(), &mut progress)
            .await
            .unwrap();

        let svc = registry.get("svc").unwrap().clone();
        let url = svc.new_url.unwrap();
        assert_eq!(url, "https://mock/rest/services/Parcels_new-0/FeatureServer");
        let create = &mock.get_method_calls("createItem")[0];
        assert_eq!(create.payload["service"]["name"], "Parcels");
        assert!(create.payload["item"].get("url").is_none());

        let data = mock.data("new-1").unwrap();
        assert_eq!(data["operationalLayers"][0]["itemId"], "new-0");
        assert_eq!(data["operationalLayers"][0]["url"], format!("{url}/0"));
        assert_eq!(mock.item("new-0").unwrap()["url"], url);
    }
}
