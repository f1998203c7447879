//! Deployment order over whole bundles.

use solution_deployer::core::SolutionError;
use solution_deployer::models::Template;
use solution_deployer::resolver::{DependencyGraph, sequence};
use solution_deployer::test_utils::TemplateFixture;
use solution_deployer::test_utils::fixtures::web_map;

fn assert_topological(templates: &[Template], order: &[String]) {
    let index = |id: &str| order.iter().position(|o| o == id).unwrap();
    for template in templates {
        for dep in &template.dependency_ids {
            assert!(
                index(dep) < index(&template.owner_id),
                "{dep} must come before {}",
                template.owner_id
            );
        }
    }
}

#[test]
fn test_dependencies_come_first() {
    let fixture = TemplateFixture::ordering();
    let order = sequence(&fixture.bundle.templates).unwrap();
    assert_eq!(order.len(), 3);
    assert_eq!(order.last().map(String::as_str), Some("abc"));
    assert_topological(&fixture.bundle.templates, &order);
}

#[test]
fn test_order_is_stable_for_independent_items() {
    let templates = vec![web_map("z", &[]), web_map("y", &[]), web_map("x", &[])];
    assert_eq!(sequence(&templates).unwrap(), vec!["z", "y", "x"]);
}

#[test]
fn test_layered_bundle_is_topological() {
    let templates = vec![
        web_map("app", &["dash", "map2"]),
        web_map("dash", &["map1", "map2"]),
        web_map("map1", &["svc1", "svc2"]),
        web_map("map2", &["svc2", "view"]),
        web_map("view", &["svc1"]),
        web_map("svc1", &[]),
        web_map("svc2", &[]),
    ];
    let order = sequence(&templates).unwrap();
    assert_eq!(order.len(), templates.len());
    assert_topological(&templates, &order);
}

#[test]
fn test_cycles_of_any_length_are_rejected() {
    let three = TemplateFixture::cyclic();
    let err = sequence(&three.bundle.templates).unwrap_err();
    assert!(matches!(err, SolutionError::CyclicDependency));
    assert_eq!(err.to_string(), "Cyclical dependency graph detected");

    let self_loop = vec![web_map("a", &["a"])];
    assert!(matches!(sequence(&self_loop), Err(SolutionError::CyclicDependency)));

    let two = vec![web_map("ok", &[]), web_map("a", &["b"]), web_map("b", &["a"])];
    assert!(matches!(sequence(&two), Err(SolutionError::CyclicDependency)));
}

#[test]
fn test_missing_dependency_is_malformed() {
    let templates = vec![web_map("a", &["nowhere"])];
    let err = sequence(&templates).unwrap_err();
    assert!(matches!(err, SolutionError::MalformedTemplate { ref owner_id, .. } if owner_id == "a"));
}

#[test]
fn test_graph_roots_and_tree() {
    let fixture = TemplateFixture::ordering();
    let graph = DependencyGraph::from_templates(&fixture.bundle.templates).unwrap();
    let roots: Vec<&str> = graph.roots().iter().map(|n| n.owner_id.as_str()).collect();
    assert_eq!(roots, vec!["abc"]);
    let tree = graph.to_tree_string("abc");
    assert!(tree.contains("abc (Web Map)"));
    assert!(tree.find("ghi").unwrap() < tree.find("def").unwrap());
}
