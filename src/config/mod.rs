//! Graph files and engine settings.
//!
//! A [`GraphFile`] describes one group: its steps by registry key, their
//! parameters, data connections, looped triggers and nested groups. Files are
//! TOML or JSON, chosen by extension.
//!
//! # App Data Location
//!
//! User graphs live under the platform data directory:
//! - **Linux**: `~/.local/share/stepgraph/graphs/`
//! - **macOS**: `~/Library/Application Support/stepgraph/graphs/`
//! - **Windows**: `%APPDATA%\stepgraph\graphs\`
//!
//! # Example
//!
//! ```ignore
//! use stepgraph::config::GraphFile;
//! use stepgraph::graph::{Group, StepRegistry};
//!
//! let registry = StepRegistry::with_builtins();
//! let file = GraphFile::load("counter.toml")?;
//! let group = Group::from_file(&registry, &file)?;
//! group.start_all();
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{GraphError, Result, ResultExt};
use crate::graph::element::{ElementRef, PATH_SEPARATOR};
use crate::graph::events::EventBus;
use crate::graph::group::{Group, TriggerConnection};
use crate::graph::parameter::ParameterValue;
use crate::graph::registry::StepRegistry;
use crate::thread::{LoopMode, LoopSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "stepgraph";

/// Subdirectory holding user graph files
pub const GRAPHS_DIR: &str = "graphs";

/// Settings filename inside the app data directory
pub const SETTINGS_FILE: &str = "settings.toml";

/// Current graph file format version
pub const GRAPH_FILE_VERSION: u32 = 1;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Directory for user graph files
pub fn graphs_dir() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(GRAPHS_DIR))
}

/// Get the path to the engine settings file
pub fn settings_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(SETTINGS_FILE))
}

/// Ensure the graphs directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = graphs_dir().ok_or_else(|| {
        GraphError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            GraphError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

// ==================== File Format ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(FileFormat::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(FileFormat::Json),
            _ => Err(GraphError::Config(format!(
                "Unsupported graph file extension: {:?}",
                path
            ))),
        }
    }
}

// ==================== Graph File ====================

/// A step entry of a graph file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementFile {
    pub name: String,

    /// Registry key of the step type
    #[serde(rename = "type")]
    pub type_key: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterValue>,
}

/// A data connection, `"step.slot"` to `"step.slot"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionFile {
    pub from: String,
    pub to: String,
}

/// A trigger registration other than a looped trigger's own listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConnectionFile {
    /// Trigger element, looped trigger or `"step.processingDone"`
    pub trigger: String,
    pub listener: String,
}

impl From<TriggerConnection> for TriggerConnectionFile {
    fn from(connection: TriggerConnection) -> Self {
        Self {
            trigger: connection.trigger,
            listener: connection.listener,
        }
    }
}

/// A looped trigger and its listeners in registration order.
///
/// Timing is given in milliseconds, or in microseconds when it has a
/// sub-millisecond part. Setting both units of one value is an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerFile {
    pub name: String,

    /// Loop interval; the engine default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_us: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<LoopMode>,

    /// Logical step size; equal to the interval when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_size_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_size_us: Option<u64>,

    /// Listener paths relative to the group
    #[serde(default)]
    pub listeners: Vec<String>,
}

impl TriggerFile {
    fn loop_settings(&self, settings: &EngineSettings) -> Result<LoopSettings> {
        let interval = file_duration(&self.name, "interval", self.interval_ms, self.interval_us)?
            .unwrap_or_else(|| settings.default_interval());
        let mut loop_settings =
            LoopSettings::with_interval(interval).mode(self.mode.unwrap_or(settings.default_mode));
        if let Some(step_size) =
            file_duration(&self.name, "step_size", self.step_size_ms, self.step_size_us)?
        {
            loop_settings = loop_settings.step_size(step_size);
        }
        Ok(loop_settings)
    }
}

fn file_duration(trigger: &str, field: &str, ms: Option<u64>, us: Option<u64>) -> Result<Option<Duration>> {
    match (ms, us) {
        (Some(_), Some(_)) => Err(GraphError::Config(format!(
            "Trigger '{}' sets both {}_ms and {}_us",
            trigger, field, field
        ))),
        (Some(ms), None) => Ok(Some(Duration::from_millis(ms))),
        (None, Some(us)) => Ok(Some(Duration::from_micros(us))),
        (None, None) => Ok(None),
    }
}

/// Split a duration into `(ms, us)` file fields, one of them set.
fn duration_fields(trigger: &str, duration: Duration) -> (Option<u64>, Option<u64>) {
    if duration.subsec_nanos() % 1_000 != 0 {
        tracing::warn!(
            "Trigger '{}': {:?} is saved rounded down to whole microseconds",
            trigger,
            duration
        );
    }
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    if micros % 1_000 == 0 {
        (Some(micros / 1_000), None)
    } else {
        (None, Some(micros))
    }
}

/// Serializable description of a group.
///
/// Plain values come before the arrays of tables so the TOML output stays
/// readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphFile {
    #[serde(default = "default_graph_file_version")]
    pub version: u32,

    pub name: String,

    /// Input connector names of this group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    /// Output connector names of this group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,

    /// Plain trigger elements of this group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plain_triggers: Vec<String>,

    #[serde(default)]
    pub elements: Vec<ElementFile>,

    #[serde(default)]
    pub connections: Vec<ConnectionFile>,

    #[serde(default)]
    pub triggers: Vec<TriggerFile>,

    #[serde(default)]
    pub trigger_connections: Vec<TriggerConnectionFile>,

    #[serde(default)]
    pub groups: Vec<GraphFile>,
}

fn default_graph_file_version() -> u32 {
    GRAPH_FILE_VERSION
}

impl GraphFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: GRAPH_FILE_VERSION,
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            plain_triggers: Vec::new(),
            elements: Vec::new(),
            connections: Vec::new(),
            triggers: Vec::new(),
            trigger_connections: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Load a graph file; the format follows the extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphError::Config(format!("Failed to read graph file {:?}: {}", path, e))
        })?;

        let file = match format {
            FileFormat::Toml => Self::from_toml_str(&content),
            FileFormat::Json => Self::from_json_str(&content),
        }
        .context(format!("Loading {:?}", path))?;

        if file.version > GRAPH_FILE_VERSION {
            tracing::warn!(
                "Graph file {:?} has version {} (newer than {}), some fields may be ignored",
                path,
                file.version,
                GRAPH_FILE_VERSION
            );
        }

        tracing::info!("Loaded graph '{}' from {:?}", file.name, path);
        Ok(file)
    }

    /// Save the graph file; the format follows the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = match FileFormat::from_path(path)? {
            FileFormat::Toml => self.to_toml_string()?,
            FileFormat::Json => self.to_json_string()?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    GraphError::Config(format!("Failed to create directory {:?}: {}", parent, e))
                })?;
            }
        }

        std::fs::write(path, content).map_err(|e| {
            GraphError::Config(format!("Failed to write graph file {:?}: {}", path, e))
        })?;

        tracing::info!("Saved graph '{}' to {:?}", self.name, path);
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| GraphError::Config(format!("Failed to parse graph file: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| GraphError::Config(format!("Failed to serialize graph file: {}", e)))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| GraphError::Config(format!("Failed to parse graph file: {}", e)))
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GraphError::Config(format!("Failed to serialize graph file: {}", e)))
    }
}

// ==================== Building Groups ====================

impl Group {
    /// Build a live group from a graph file with default engine settings.
    pub fn from_file(registry: &StepRegistry, file: &GraphFile) -> Result<Arc<Group>> {
        Self::from_file_with(registry, file, &EngineSettings::default())
    }

    pub fn from_file_with(
        registry: &StepRegistry,
        file: &GraphFile,
        settings: &EngineSettings,
    ) -> Result<Arc<Group>> {
        let group = Group::with_events(&file.name, EventBus::new(settings.event_capacity))?;
        group
            .populate(registry, file, settings)
            .context(format!("Building group '{}'", file.name))?;
        Ok(group)
    }

    fn populate(&self, registry: &StepRegistry, file: &GraphFile, settings: &EngineSettings) -> Result<()> {
        for name in &file.inputs {
            self.add_input_connector(name)?;
        }
        for name in &file.outputs {
            self.add_output_connector(name)?;
        }

        for element in &file.elements {
            let step = self.create_step(registry, &element.type_key, &element.name)?;
            for (name, value) in &element.parameters {
                step.set_parameter(name, value.clone())
                    .context(format!("Setting parameter of '{}'", element.name))?;
            }
        }

        for name in &file.plain_triggers {
            self.add_trigger(name)?;
        }

        for child in &file.groups {
            let group = Group::from_file_with(registry, child, settings)?;
            self.add_group(group)?;
        }

        for connection in &file.connections {
            self.connect(&connection.from, &connection.to)?;
        }

        for trigger in &file.triggers {
            self.add_looped_trigger(&trigger.name, trigger.loop_settings(settings)?)?;
            for listener in &trigger.listeners {
                self.connect_trigger(&trigger.name, listener)?;
            }
        }

        for connection in &file.trigger_connections {
            self.connect_trigger(&connection.trigger, &connection.listener)?;
        }

        Ok(())
    }

    /// Describe this group as a graph file that
    /// [`from_file`](Self::from_file) builds again.
    ///
    /// Trigger registrations are written with the paths they were made
    /// with; registrations made on a trigger directly, bypassing
    /// [`connect_trigger`](Self::connect_trigger), are only kept for looped
    /// triggers whose listener is an element of this group.
    pub fn to_file(&self) -> GraphFile {
        let mut file = GraphFile::new(self.name());
        file.inputs = self.input_connectors();
        file.outputs = self.output_connectors();

        for step in self.steps() {
            let name = step.name();
            if file.inputs.iter().any(|n| n == name) || file.outputs.iter().any(|n| n == name) {
                continue;
            }
            file.elements.push(ElementFile {
                name: name.to_string(),
                type_key: step.type_key().to_string(),
                parameters: step.parameters(),
            });
        }

        file.connections = self
            .connections()
            .into_iter()
            .map(|c| ConnectionFile {
                from: c.source,
                to: c.target,
            })
            .collect();

        for trigger in self.looped_triggers() {
            let loop_settings = trigger.settings();
            let (interval_ms, interval_us) = duration_fields(trigger.name(), loop_settings.interval);
            let (step_size_ms, step_size_us) = if loop_settings.step_size != loop_settings.interval {
                duration_fields(trigger.name(), loop_settings.step_size)
            } else {
                (None, None)
            };
            file.triggers.push(TriggerFile {
                name: trigger.name().to_string(),
                interval_ms,
                interval_us,
                mode: Some(loop_settings.mode),
                step_size_ms,
                step_size_us,
                listeners: self.listener_paths(&trigger),
            });
        }

        // a looped trigger's own listeners are written with the trigger
        file.trigger_connections = self
            .trigger_connections()
            .into_iter()
            .filter(|c| c.trigger.contains(PATH_SEPARATOR) || self.looped_trigger(&c.trigger).is_err())
            .map(TriggerConnectionFile::from)
            .collect();

        for element in self.elements() {
            match element {
                ElementRef::Group(child) => file.groups.push(child.to_file()),
                ElementRef::Trigger(trigger) => file.plain_triggers.push(trigger.name().to_string()),
                _ => {}
            }
        }

        file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::steps::{COUNTER, STATIC_GAIN, SUM};

    const COUNTER_GRAPH: &str = r#"
name = "root"

[[elements]]
name = "counter"
type = "stepgraph.Counter"

[[elements]]
name = "gain"
type = "stepgraph.StaticGain"
parameters = { gain = 2.0 }

[[connections]]
from = "counter.out"
to = "gain.in"

[[triggers]]
name = "loop"
interval_ms = 10
listeners = ["counter"]
"#;

    #[test]
    fn test_app_data_dir() {
        if let Some(dir) = graphs_dir() {
            assert!(dir.ends_with("stepgraph/graphs"));
        }
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(FileFormat::from_path(Path::new("a.toml")).unwrap(), FileFormat::Toml);
        assert_eq!(FileFormat::from_path(Path::new("a.JSON")).unwrap(), FileFormat::Json);
        assert!(matches!(
            FileFormat::from_path(Path::new("a.yaml")),
            Err(GraphError::Config(_))
        ));
    }

    #[test]
    fn test_parse_toml() {
        let file = GraphFile::from_toml_str(COUNTER_GRAPH).unwrap();
        assert_eq!(file.version, GRAPH_FILE_VERSION);
        assert_eq!(file.elements.len(), 2);
        assert_eq!(file.elements[0].type_key, COUNTER);
        assert_eq!(
            file.elements[1].parameters.get("gain"),
            Some(&ParameterValue::Float(2.0))
        );
        assert_eq!(file.triggers[0].listeners, vec!["counter"]);
    }

    #[test]
    fn test_build_group() {
        let registry = StepRegistry::with_builtins();
        let file = GraphFile::from_toml_str(COUNTER_GRAPH).unwrap();
        let group = Group::from_file(&registry, &file).unwrap();

        assert_eq!(group.step("gain").unwrap().parameter("gain"), Some(ParameterValue::Float(2.0)));
        let looped = group.looped_trigger("loop").unwrap();
        assert_eq!(looped.settings().interval, Duration::from_millis(10));
        assert_eq!(looped.listener_names(), vec!["counter"]);
        assert_eq!(group.connections().len(), 1);
    }

    #[test]
    fn test_build_errors() {
        let registry = StepRegistry::with_builtins();

        let mut file = GraphFile::new("root");
        file.elements.push(ElementFile {
            name: "x".to_string(),
            type_key: "nope".to_string(),
            parameters: BTreeMap::new(),
        });
        let err = Group::from_file(&registry, &file).unwrap_err();
        assert!(matches!(err.root(), GraphError::UnknownStepType(_)));

        let mut file = GraphFile::new("root");
        file.elements.push(ElementFile {
            name: "gain".to_string(),
            type_key: STATIC_GAIN.to_string(),
            parameters: BTreeMap::from([("gain".to_string(), ParameterValue::from("high"))]),
        });
        let err = Group::from_file(&registry, &file).unwrap_err();
        assert!(matches!(err.root(), GraphError::InvalidParameter { .. }));
    }

    #[test]
    fn test_save_load_round_trip() {
        let registry = StepRegistry::with_builtins();
        let group = Group::from_file(&registry, &GraphFile::from_toml_str(COUNTER_GRAPH).unwrap()).unwrap();

        let child = Group::new("inner").unwrap();
        child.add_input_connector("x").unwrap();
        child.add_output_connector("y").unwrap();
        child.create_step(&registry, SUM, "sum").unwrap();
        child.connect("x.output", "sum.a").unwrap();
        child.connect("sum.out", "y.input").unwrap();
        group.add_group(child).unwrap();
        group.connect("gain.out", "inner.x").unwrap();

        let file = group.to_file();
        assert_eq!(file.groups.len(), 1);
        assert_eq!(file.groups[0].inputs, vec!["x"]);
        assert_eq!(file.groups[0].elements.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        for ext in ["toml", "json"] {
            let path = dir.path().join(format!("graph.{}", ext));
            file.save(&path).unwrap();
            let loaded = GraphFile::load(&path).unwrap();
            assert_eq!(loaded, file);

            let rebuilt = Group::from_file(&registry, &loaded).unwrap();
            assert_eq!(rebuilt.to_file(), file);
        }
    }

    #[test]
    fn test_trigger_paths_survive_round_trip() {
        let registry = StepRegistry::with_builtins();
        let root = Group::new("root").unwrap();
        root.create_step(&registry, COUNTER, "counter").unwrap();
        let child = Group::new("child").unwrap();
        child.create_step(&registry, COUNTER, "inner").unwrap();
        root.add_group(child).unwrap();
        root.add_trigger("manual").unwrap();
        root.add_looped_trigger("loop", LoopSettings::with_interval(Duration::from_micros(500)))
            .unwrap();
        root.connect_trigger("loop", "counter").unwrap();
        root.connect_trigger("loop", "child.inner").unwrap();
        root.connect_trigger("counter.processingDone", "manual").unwrap();

        let file = root.to_file();
        let trigger = &file.triggers[0];
        assert_eq!(trigger.listeners, vec!["counter", "child.inner"]);
        assert_eq!(trigger.interval_ms, None);
        assert_eq!(trigger.interval_us, Some(500));
        assert_eq!(file.plain_triggers, vec!["manual"]);
        assert_eq!(
            file.trigger_connections,
            vec![TriggerConnectionFile {
                trigger: "counter.processingDone".to_string(),
                listener: "manual".to_string(),
            }]
        );

        let loaded = GraphFile::from_toml_str(&file.to_toml_string().unwrap()).unwrap();
        let rebuilt = Group::from_file(&registry, &loaded).unwrap();
        let looped = rebuilt.looped_trigger("loop").unwrap();
        assert_eq!(looped.settings().interval, Duration::from_micros(500));
        assert_eq!(looped.listener_names(), vec!["counter", "inner"]);
        assert_eq!(
            rebuilt.step("counter").unwrap().finished_trigger().listener_names(),
            vec!["manual"]
        );
        assert_eq!(rebuilt.to_file(), file);
    }

    #[test]
    fn test_both_timing_units_rejected() {
        let registry = StepRegistry::with_builtins();
        let mut file = GraphFile::new("root");
        file.triggers.push(TriggerFile {
            name: "loop".to_string(),
            interval_ms: Some(1),
            interval_us: Some(1_000),
            mode: None,
            step_size_ms: None,
            step_size_us: None,
            listeners: Vec::new(),
        });
        let err = Group::from_file(&registry, &file).unwrap_err();
        assert!(matches!(err.root(), GraphError::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GraphFile::load(dir.path().join("missing.toml")),
            Err(GraphError::Config(_))
        ));
    }
}
