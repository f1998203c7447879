//! Templatization idempotence, round trips and word-boundary safety.

use serde_json::{Value, json};
use solution_deployer::deployer::templatize_bundle;
use solution_deployer::settings::{ItemSettings, SettingsRegistry};
use solution_deployer::templating::{
    Detemplatizer, templatize_layer, templatize_popup_info, templatize_property,
};
use solution_deployer::test_utils::fixtures::SOURCE_SERVICE_URL;
use solution_deployer::test_utils::{TemplateFixture, layer, view_layer};

fn rich_layer() -> Value {
    let mut layer = layer(0, "Parcels", &["OWNER", "Status", "EMP_CY", "EMP_CY2"]);
    layer["drawingInfo"] = json!({
        "renderer": {"type": "uniqueValue", "field1": "Status", "valueExpression": "$feature.EMP_CY2 / $feature[\"EMP_CY\"]"},
        "labelingInfo": [{"labelExpression": "[OWNER]", "labelExpressionInfo": {"expression": "$feature.OWNER"}}]
    });
    layer["templates"] = json!([{"name": "New", "prototype": {"attributes": {"Status": 1, "OWNER": null}}}]);
    layer
}

fn registry_with(renames: &[(&str, &str)]) -> SettingsRegistry {
    let mut registry = SettingsRegistry::new();
    registry.register("svc", ItemSettings::new("new-svc").with_url("https://dest/FeatureServer")).unwrap();
    let map = renames.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    registry.merge_field_infos("svc", 0, map).unwrap();
    registry
}

#[test]
fn test_templatize_is_idempotent() {
    let layer = rich_layer();
    let once = templatize_layer(&layer, "svc");
    assert_ne!(once, layer);
    assert_eq!(templatize_layer(&once, "svc"), once);

    let popup = json!({
        "title": "{OWNER} ({Status})",
        "fieldInfos": [{"fieldName": "EMP_CY"}],
        "expressionInfos": [{"expression": "IIf($feature.EMP_CY2 > 0, 'y', 'n')"}]
    });
    let popup_once = templatize_popup_info(&popup, &layer, "svc");
    assert_eq!(templatize_popup_info(&popup_once, &layer, "svc"), popup_once);
}

#[test]
fn test_round_trip_with_identity_renames() {
    let layer = rich_layer();
    let templatized = templatize_layer(&layer, "svc");
    let registry = registry_with(&[
        ("owner", "OWNER"),
        ("status", "Status"),
        ("emp_cy", "EMP_CY"),
        ("emp_cy2", "EMP_CY2"),
        ("objectid", "OBJECTID"),
        ("creator", "Creator"),
        ("editor", "Editor"),
    ]);
    assert_eq!(Detemplatizer::new(&registry).resolve_value(&templatized), layer);
}

#[test]
fn test_round_trip_without_renames_lowercases_leaves() {
    let layer = rich_layer();
    let templatized = templatize_layer(&layer, "svc");
    let registry = registry_with(&[]);
    let resolved = Detemplatizer::new(&registry).resolve_value(&templatized);

    assert_eq!(resolved["displayField"], "owner");
    assert_eq!(resolved["definitionExpression"], "owner IS NOT NULL");
    assert_eq!(resolved["drawingInfo"]["renderer"]["field1"], "status");
    assert_eq!(resolved["drawingInfo"]["labelingInfo"][0]["labelExpression"], "[owner]");
    assert_eq!(resolved["templates"][0]["prototype"]["attributes"], json!({"status": 1, "owner": null}));
    // untemplatized parts are untouched
    assert_eq!(resolved["fields"], layer["fields"]);
    assert_eq!(resolved["name"], "Parcels");
}

#[test]
fn test_word_boundaries_between_similar_names() {
    let layer = rich_layer();
    let out = templatize_layer(&layer, "svc");
    assert_eq!(
        out["drawingInfo"]["renderer"]["valueExpression"],
        "$feature.{{svc.fieldInfos.layer0.fields.emp_cy2}} / $feature[\"{{svc.fieldInfos.layer0.fields.emp_cy}}\"]"
    );

    let popup = json!({"title": "{EMP_CY} vs {EMP_CY2}"});
    let out = templatize_popup_info(&popup, &layer, "svc");
    assert_eq!(
        out["title"],
        "{{{svc.fieldInfos.layer0.fields.emp_cy}}} vs {{{svc.fieldInfos.layer0.fields.emp_cy2}}}"
    );
}

#[test]
fn test_templatize_property_folds_leaf_only() {
    let mut object = json!({"someProp": "NaMe"});
    let map = object.as_object_mut().unwrap();
    templatize_property(map, "someProp", "AbC.fieldInfos.layer1.fields");
    assert_eq!(object, json!({"someProp": "{{AbC.fieldInfos.layer1.fields.name}}"}));
}

#[test]
fn test_bundle_references_become_placeholders() {
    let fixture = TemplateFixture::service_and_map();
    let bundle = templatize_bundle(&fixture.bundle);

    let map = bundle.get("map").unwrap();
    let layers = &map.data_doc.as_ref().unwrap()["operationalLayers"];
    assert_eq!(layers[0]["itemId"], "{{svc.id}}");
    assert_eq!(layers[0]["url"], "{{svc.layer0.url}}");
    assert_eq!(layers[1]["url"], "{{svc.layer1.url}}");

    let svc = bundle.get("svc").unwrap();
    assert_eq!(svc.base_doc["url"], "{{svc.url}}");
    assert_eq!(svc.base_doc["id"], "{{svc.id}}");
    let popup_title = &svc.data_doc.as_ref().unwrap()["layers"][1]["popupInfo"]["title"];
    assert_eq!(popup_title, "{{{svc.fieldInfos.layer1.fields.height}}}");
    assert!(!serde_json::to_string(&bundle).unwrap().contains(SOURCE_SERVICE_URL));
}

#[test]
fn test_view_points_at_source_service() {
    let view = view_layer(0, "Parcels", 2, &["OWNER"]);
    let template = solution_deployer::models::Template::new(
        "view",
        solution_deployer::core::ItemKind::FeatureService,
        json!({"id": "view", "name": "Parcels_view"}),
    )
    .with_dependencies(["svc"])
    .with_properties(json!({"service": {"isView": true}, "layers": [view]}));
    let source = TemplateFixture::service_and_map().bundle.get("svc").cloned().unwrap();
    let bundle = solution_deployer::models::Bundle::new(vec![template, source]);

    let out = templatize_bundle(&bundle);
    let table = &out.get("view").unwrap().extra_props.as_ref().unwrap()["layers"][0]["adminLayerInfo"]
        ["viewLayerDefinition"]["table"];
    assert_eq!(table["sourceServiceName"], "{{svc.name}}");
    assert_eq!(table["sourceLayerFields"][0]["source"], "{{svc.fieldInfos.layer2.fields.owner}}");
}
