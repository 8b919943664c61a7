//! Building, running and saving graphs described by graph files

mod common;

use common::assert_float_eq;
use common::builders::{scalar, step};
use std::time::Duration;
use stepgraph::config::{EngineSettings, GraphFile};
use stepgraph::graph::steps::GROUP_SOURCE;
use stepgraph::{Group, GraphError, LoopMode, StepRegistry};

const NESTED_GRAPH: &str = r#"
name = "root"

[[elements]]
name = "counter"
type = "stepgraph.Counter"

[[elements]]
name = "offset"
type = "stepgraph.Expression"
parameters = { expression = "value + 1.0" }

[[connections]]
from = "counter.out"
to = "scale.x"

[[connections]]
from = "scale.y"
to = "offset.in"

[[triggers]]
name = "loop"
interval_ms = 5
mode = "Simulated"
listeners = ["counter"]

[[groups]]
name = "scale"
inputs = ["x"]
outputs = ["y"]

[[groups.elements]]
name = "gain"
type = "stepgraph.StaticGain"
parameters = { gain = 3.0 }

[[groups.connections]]
from = "x.output"
to = "gain.in"

[[groups.connections]]
from = "gain.out"
to = "y.input"
"#;

fn write_graph(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_nested_graph_from_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_graph(&dir, "nested.toml", NESTED_GRAPH);
    let registry = StepRegistry::with_builtins();

    let file = GraphFile::load(&path).unwrap();
    let group = Group::from_file(&registry, &file).unwrap();
    let scale = group.group("scale").unwrap();
    assert!(scale.events().same_bus(&group.events()));
    assert_eq!(scale.step("x").unwrap().type_key(), GROUP_SOURCE);

    let trigger = group.looped_trigger("loop").unwrap();
    assert_eq!(trigger.settings().mode, LoopMode::Simulated);
    for _ in 0..3 {
        trigger.single_step().unwrap();
    }

    assert_float_eq(scale.step("gain").unwrap().output_value("out").unwrap().as_scalar().unwrap(), 9.0, 1e-9);
    assert_float_eq(scalar(&group, "offset.out"), 10.0, 1e-9);
    assert_eq!(step(&group, "offset").compute_count(), 3);
    // dotted paths reach into nested groups
    assert_eq!(group.step("scale.gain").unwrap().compute_count(), 3);
}

#[test]
fn test_save_as_json_and_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let registry = StepRegistry::with_builtins();
    let group = Group::from_file(&registry, &GraphFile::from_toml_str(NESTED_GRAPH).unwrap()).unwrap();

    let saved = group.to_file();
    let path = dir.path().join("saved").join("nested.json");
    saved.save(&path).unwrap();

    let loaded = GraphFile::load(&path).unwrap();
    assert_eq!(loaded, saved);
    assert_eq!(loaded.groups[0].inputs, vec!["x"]);
    assert_eq!(loaded.groups[0].outputs, vec!["y"]);

    let rebuilt = Group::from_file(&registry, &loaded).unwrap();
    assert_eq!(rebuilt.to_file(), saved);
    assert_eq!(rebuilt.connections(), group.connections());
}

#[test]
fn test_engine_defaults_fill_missing_timing() {
    let file = GraphFile::from_toml_str(
        r#"
name = "root"

[[elements]]
name = "counter"
type = "stepgraph.Counter"

[[triggers]]
name = "loop"
listeners = ["counter"]
"#,
    )
    .unwrap();
    let settings = EngineSettings {
        default_interval_ms: 25,
        default_mode: LoopMode::Fixed,
        ..Default::default()
    };

    let group = Group::from_file_with(&StepRegistry::with_builtins(), &file, &settings).unwrap();
    let loop_settings = group.looped_trigger("loop").unwrap().settings();
    assert_eq!(loop_settings.interval, Duration::from_millis(25));
    assert_eq!(loop_settings.step_size, Duration::from_millis(25));
    assert_eq!(loop_settings.mode, LoopMode::Fixed);
}

#[test]
fn test_bad_connection_names_the_group() {
    let file = GraphFile::from_toml_str(
        r#"
name = "root"

[[elements]]
name = "counter"
type = "stepgraph.Counter"

[[connections]]
from = "counter.out"
to = "missing.in"
"#,
    )
    .unwrap();

    let err = Group::from_file(&StepRegistry::with_builtins(), &file).unwrap_err();
    assert!(err.to_string().contains("root"));
    assert!(matches!(err.root(), GraphError::UnknownElement(_)));
}

#[test]
fn test_unknown_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_graph(&dir, "graph.yaml", NESTED_GRAPH);
    assert!(matches!(GraphFile::load(&path), Err(GraphError::Config(_))));
}
