//! Full deployments against the recording mock catalog.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

use solution_deployer::catalog::mock::MockCatalog;
use solution_deployer::core::{ItemKind, SolutionError};
use solution_deployer::deployer::{
    DeployOptions, FailurePolicy, ProgressEvent, ProgressReporter, ProgressStatus, deploy_bundle,
    templatize_bundle,
};
use solution_deployer::models::{Bundle, Template};
use solution_deployer::settings::SettingsRegistry;
use solution_deployer::test_utils::fixtures::feature_service;
use solution_deployer::test_utils::{TemplateFixture, init_test_logging, layer, view_layer};

fn recorder() -> (Arc<Mutex<Vec<ProgressEvent>>>, ProgressReporter<'static>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let reporter = ProgressReporter::new(
        1,
        Box::new(move |event: &ProgressEvent| {
            sink.lock().push(event.clone());
            true
        }),
    );
    (events, reporter)
}

#[tokio::test]
async fn test_service_and_map_deployment() {
    init_test_logging(None);
    let bundle = templatize_bundle(&TemplateFixture::service_and_map().bundle);
    let mock = MockCatalog::new().lowercase_fields();
    let mut registry = SettingsRegistry::new();
    let (events, mut progress) = recorder();

    let report = deploy_bundle(&bundle, &mock, &mut registry, &DeployOptions::default(), &mut progress)
        .await
        .unwrap();

    assert_eq!(report.order, vec!["svc", "map"]);
    assert!(report.is_complete());

    // the service was assembled one part per call, in local id order
    let svc = registry.get("svc").unwrap().clone();
    let svc_url = svc.new_url.clone().unwrap();
    let adds = mock.get_method_calls("addToDefinition");
    assert_eq!(adds.len(), 2);
    assert_eq!(adds[0].payload[0]["id"], 0);
    assert_eq!(adds[1].payload[0]["id"], 1);
    assert_eq!(adds[0].payload[0]["displayField"], serde_json::Value::Null);
    assert_eq!(adds[0].payload[0]["serviceItemId"], serde_json::Value::Null);

    // field names were settled from the read-back
    assert_eq!(svc.field_name(0, "status"), Some("status"));
    assert_eq!(svc.field_name(1, "height"), Some("height"));
    let parts = mock.parts(&svc_url);
    assert_eq!(parts[0]["displayField"], "owner");

    // popups were resolved and pushed with the final update
    let svc_data = mock.data(&svc.new_id).unwrap();
    assert_eq!(svc_data["layers"][0]["popupInfo"]["title"], "{owner}");

    // the map points at the deployed service
    let map_id = &registry.get("map").unwrap().new_id;
    let map_data = mock.data(map_id).unwrap();
    assert_eq!(map_data["operationalLayers"][0]["itemId"], svc.new_id.as_str());
    assert_eq!(map_data["operationalLayers"][1]["url"], format!("{svc_url}/1"));

    // progress: cost only grows and every item finishes with done
    let events = events.lock();
    assert!(events.windows(2).all(|w| w[0].cost_used <= w[1].cost_used));
    let statuses: Vec<(&str, ProgressStatus)> =
        events.iter().map(|e| (e.process_id.as_str(), e.status)).collect();
    assert_eq!(
        statuses,
        vec![
            ("svc", ProgressStatus::Started),
            ("svc", ProgressStatus::Created),
            ("svc", ProgressStatus::AddedPart),
            ("svc", ProgressStatus::AddedPart),
            ("svc", ProgressStatus::Updated),
            ("svc", ProgressStatus::Updated),
            ("svc", ProgressStatus::Done),
            ("map", ProgressStatus::Started),
            ("map", ProgressStatus::Created),
            ("map", ProgressStatus::Updated),
            ("map", ProgressStatus::Done),
        ]
    );
    let last = events.last().unwrap();
    assert_eq!(last.cost_used, 4);
    assert!(last.total_cost >= last.cost_used);
}

#[tokio::test]
async fn test_third_part_failure_stops_the_composite() {
    let layers = (0..4).map(|id| layer(id, &format!("L{id}"), &["OWNER"])).collect();
    let bundle = templatize_bundle(&Bundle::new(vec![feature_service("svc", "Parcels", layers)]));
    let failure = json!({"code": 400, "message": "Invalid definition for layer 2"});
    let mock = MockCatalog::new().fail_on("addToDefinition", 3, failure.clone());
    let mut registry = SettingsRegistry::new();
    let (events, mut progress) = recorder();

    let err = deploy_bundle(&bundle, &mock, &mut registry, &DeployOptions::default(), &mut progress)
        .await
        .unwrap_err();

    let submitted: Vec<i64> = mock
        .get_method_calls("addToDefinition")
        .iter()
        .map(|c| c.payload[0]["id"].as_i64().unwrap())
        .collect();
    assert_eq!(submitted, vec![0, 1, 2]);
    match err {
        SolutionError::PartialCompositeFailure {
            owner_id,
            part_id,
            attempted,
            source,
        } => {
            assert_eq!(owner_id, "svc");
            assert_eq!(part_id, 2);
            assert_eq!(attempted, 3);
            assert!(!source.success);
            assert_eq!(source.error, failure);
        }
        other => panic!("unexpected error: {other}"),
    }
    // no rollback and no final update
    assert!(!mock.was_called("deleteItem"));
    assert!(!mock.was_called("updateDefinition"));
    assert_eq!(events.lock().last().unwrap().status, ProgressStatus::Failed);
}

#[tokio::test]
async fn test_view_follows_source_field_names() {
    let source = feature_service("svc", "Parcels", vec![layer(0, "Parcels", &["OWNER", "Status"])]);
    let view = Template::new(
        "view",
        ItemKind::FeatureService,
        json!({"id": "view", "name": "Parcels_view", "typeKeywords": ["View Service"]}),
    )
    .with_dependencies(["svc"])
    .with_properties(json!({"service": {"isView": true}, "layers": [view_layer(0, "Parcels", 0, &["OWNER"])]}));
    let bundle = templatize_bundle(&Bundle::new(vec![view, source]));
    let mock = MockCatalog::new().lowercase_fields();
    let mut registry = SettingsRegistry::new();
    let mut progress = ProgressReporter::silent(bundle.total_cost());

    deploy_bundle(&bundle, &mock, &mut registry, &DeployOptions::default(), &mut progress)
        .await
        .unwrap();

    let svc_name = registry.get("svc").unwrap().new_name.clone().unwrap();
    let view_settings = registry.get("view").unwrap().clone();
    assert!(view_settings.source_field_infos.contains_key("svc"));

    let view_url = view_settings.new_url.unwrap();
    let updates: Vec<_> = mock
        .get_method_calls("updateDefinition")
        .into_iter()
        .filter(|c| c.target == view_url)
        .collect();
    assert_eq!(updates.len(), 1);
    let table = &updates[0].payload["definition"]["adminLayerInfo"]["viewLayerDefinition"]["table"];
    assert_eq!(table["sourceServiceName"], svc_name.as_str());
    assert_eq!(table["sourceLayerFields"][0]["source"], "owner");
}

#[tokio::test]
async fn test_continue_policy_reports_partial_deployment() {
    let bundle = templatize_bundle(&TemplateFixture::service_and_map().bundle);
    let mock = MockCatalog::new().fail_on("addToDefinition", 1, json!({"message": "locked"}));
    let mut registry = SettingsRegistry::new();
    let mut progress = ProgressReporter::silent(bundle.total_cost());
    let options = DeployOptions {
        folder: Some("solutions".to_string()),
        failure_policy: FailurePolicy::Continue,
    };

    let report = deploy_bundle(&bundle, &mock, &mut registry, &options, &mut progress).await.unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.skipped, vec!["map"]);
    assert!(report.deployed.is_empty());
    let create = &mock.get_method_calls("createItem")[0];
    assert_eq!(create.payload["folder"], "solutions");
}
