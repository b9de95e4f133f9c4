//! Integration tests for planning a sweep: expansion, patching, naming, and output-node choice

use super::test_utils::{config, steps_by_cfg, sweep, workflow};
use serde_json::json;
use std::collections::HashSet;
use wedge::error::{ResolutionError, WedgeError};
use wedge::naming::output_name;
use wedge::orchestrator::{RunOptions, Sweep};
use wedge::workflow::{patch, resolve_output_node, NodeRecord, WorkflowGraph};

#[test]
fn test_steps_by_cfg_product_order() {
    let options = RunOptions::default();
    let sweep = sweep(steps_by_cfg(), &options);
    let combos: Vec<_> = sweep.plan().iter().collect();

    assert_eq!(sweep.plan().total(), 9);
    assert_eq!(combos.len(), 9);
    assert_eq!(combos[0].get("KSampler", "steps"), Some(&json!(10)));
    assert_eq!(combos[0].get("KSampler", "cfg"), Some(&json!(3)));
    assert_eq!(combos[8].get("KSampler", "steps"), Some(&json!(30)));
    assert_eq!(combos[8].get("KSampler", "cfg"), Some(&json!(9)));
    let indices: Vec<_> = combos.iter().map(|c| c.index).collect();
    assert_eq!(indices, (1..=9).collect::<Vec<_>>());
}

#[test]
fn test_override_only_config_plans_one_job() {
    let options = RunOptions::default();
    let cfg = config(json!({"KSampler": [["seed", 12345]]}), json!({}));
    let sweep = sweep(cfg, &options);
    let jobs = sweep.dry_run(&options).unwrap();

    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].combination.is_empty());
    assert_eq!(jobs[0].output_name, "wedge");
    assert_eq!(jobs[0].graph.input("3", "seed"), Some(&json!(12345)));
}

#[test]
fn test_declared_but_empty_wedges_rejected() {
    let cfg = config(json!({}), json!({"KSampler": []}));
    let err = Sweep::new(workflow(), cfg, &RunOptions::default()).unwrap_err();
    assert!(err.is_config(), "{}", err);
}

#[test]
fn test_axis_ceiling_comes_from_options() {
    let cfg = config(
        json!({}),
        json!({"KSampler": [["seed", [0, 1000, 1], "minmax"]]}),
    );
    let options = RunOptions {
        max_axis_values: 100,
        ..RunOptions::default()
    };
    let err = Sweep::new(workflow(), cfg, &options).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_output_node_title_then_save_class() {
    // Titled node present and unique.
    let graph = workflow();
    assert_eq!(
        resolve_output_node(&graph, Some("OUT_image"), "SaveImage").unwrap(),
        "9"
    );

    // Title absent, single save node.
    let mut untitled = WorkflowGraph::new();
    untitled.insert("12", NodeRecord::new("SaveImage").with_input("filename_prefix", json!("x")));
    assert_eq!(
        resolve_output_node(&untitled, Some("OUT_image"), "SaveImage").unwrap(),
        "12"
    );

    // Two candidates, no title match.
    untitled.insert("13", NodeRecord::new("SaveImage").with_input("filename_prefix", json!("y")));
    match resolve_output_node(&untitled, Some("OUT_image"), "SaveImage") {
        Err(ResolutionError::AmbiguousOutputNode { candidates }) => {
            assert_eq!(candidates, vec!["12".to_string(), "13".to_string()]);
        }
        other => panic!("expected ambiguity, got {:?}", other),
    }
}

#[test]
fn test_title_resolution_rejects_ambiguous_targets() {
    let mut graph = workflow();
    graph.insert(
        "4",
        NodeRecord::new("KSampler")
            .with_title("KSampler")
            .with_input("cfg", json!(1)),
    );
    let cfg = config(json!({}), json!({"KSampler": [["cfg", [2], "explicit"]]}));
    let sweep = Sweep::new(graph, cfg, &RunOptions::default()).unwrap();
    let err = sweep.dry_run(&RunOptions::default()).unwrap_err();
    match err.root() {
        WedgeError::Resolution(ResolutionError::AmbiguousNode { candidates, .. }) => {
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_patch_is_idempotent_and_keeps_base() {
    let base = workflow();
    let options = RunOptions::default();
    let sweep = sweep(steps_by_cfg(), &options);
    let combo = sweep.plan().iter().nth(4).unwrap();

    let first = patch(&base, &sweep.config().overrides, &combo).unwrap();
    let second = patch(&base, &sweep.config().overrides, &combo).unwrap();
    assert_eq!(first, second);
    assert_eq!(base, workflow());
    assert_eq!(first.input("3", "steps"), Some(&json!(20)));
    assert_eq!(first.input("3", "cfg"), Some(&json!(6)));
}

#[test]
fn test_unknown_fields_survive_patching() {
    let raw = r#"{
        "3": {"class_type": "KSampler", "inputs": {"cfg": 7}, "_meta": {"title": "KSampler", "color": "red"}, "is_changed": ["x"]},
        "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "x"}}
    }"#;
    let base = WorkflowGraph::from_json_str(raw).unwrap();
    let cfg = config(json!({}), json!({"KSampler": [["cfg", [5], "explicit"]]}));
    let options = RunOptions::default();
    let jobs = Sweep::new(base, cfg, &options)
        .unwrap()
        .dry_run(&options)
        .unwrap();
    let prompt = jobs[0].request().unwrap().prompt;
    assert_eq!(prompt["3"]["inputs"]["cfg"], 5);
    assert_eq!(prompt["3"]["_meta"]["color"], "red");
    assert_eq!(prompt["3"]["is_changed"], json!(["x"]));
}

#[test]
fn test_names_are_unique_across_the_sweep() {
    let cfg = config(
        json!({}),
        json!({
            "KSampler": [["cfg", [0.5, 1, 1.5, 2], "explicit"]],
            "CLIPTextEncode": [["text", ["a cat", "a_cat", "a  cat", "a/cat"], "explicit"]]
        }),
    );
    let options = RunOptions::default();
    let sweep = sweep_with_text(cfg, &options);
    let names: Vec<String> = sweep
        .plan()
        .iter()
        .map(|c| output_name(&c, &sweep.config().filename_prefix))
        .collect();
    let unique: HashSet<_> = names.iter().collect();
    assert_eq!(unique.len(), names.len());
    assert!(names.iter().all(|n| !n.contains('/') && !n.contains(' ')));
}

fn sweep_with_text(cfg: wedge::config::WedgeConfig, options: &RunOptions) -> Sweep {
    let mut graph = workflow();
    graph.insert(
        "6",
        NodeRecord::new("CLIPTextEncode")
            .with_title("CLIPTextEncode")
            .with_input("text", json!("")),
    );
    Sweep::new(graph, cfg, options).unwrap()
}
