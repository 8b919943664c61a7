//! # stepgraph: dataflow computation graphs
//!
//! Computing elements ("steps") exchange data through typed slots and are
//! executed by trigger propagation. A looped trigger runs on its own thread
//! and starts a propagation round every interval; each step fires its
//! "finished" trigger after computing so downstream steps follow in the same
//! round. Feedback cycles are allowed: a step reached twice in one round runs
//! once, and the back edge delivers last round's value.
//!
//! ## Architecture
//!
//! - **Graph**: steps, triggers and groups ([`graph`])
//! - **Threads**: the start/stop state machine and self-pacing loops ([`thread`])
//! - **Locking**: per-step lock sets acquired in a global order ([`sync`])
//! - **Scripting**: Rhai expressions for the expression step ([`scripting`])
//! - **Configuration**: TOML/JSON graph files and engine settings ([`config`])
//!
//! ## Example
//!
//! ```ignore
//! use stepgraph::graph::{Group, StepRegistry};
//! use stepgraph::thread::LoopSettings;
//!
//! let registry = StepRegistry::with_builtins();
//! let group = Group::new("root")?;
//! group.create_step(&registry, "stepgraph.Counter", "counter")?;
//! group.create_step(&registry, "stepgraph.StaticGain", "gain")?;
//! group.connect("counter.out", "gain.in")?;
//! group.add_looped_trigger("loop", LoopSettings::default())?;
//! group.connect_trigger("loop", "counter")?;
//!
//! group.start_all();
//! std::thread::sleep(std::time::Duration::from_millis(100));
//! group.stop_all();
//! println!("{}", group.snapshot().to_json_pretty()?);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod scripting;
pub mod sync;
pub mod thread;

// Re-export commonly used types
pub use config::{EngineSettings, GraphFile};
pub use error::{GraphError, Result, StepError};
pub use graph::{
    ComputeContext, DataType, DataValue, Group, LoopedTrigger, Step, StepNode, StepRegistry,
    StepState, Trigger, Validity,
};
pub use scripting::ExpressionEngine;
pub use thread::{LoopMode, LoopSettings, StepTime, ThreadState};
