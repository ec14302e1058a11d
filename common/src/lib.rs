//! Planificación y ejecución de pipelines de stages map/reduce.
//!
//! Cada stage es una invocación de la herramienta externa (`mapredo`). Las
//! cadenas lineales se unen con pipes; cuando un stage alimenta a varios
//! consumidores su salida va a un archivo puente.

pub mod compiler;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod planner;
pub mod readiness;
pub mod runner;
pub mod settings;
pub mod stage;

pub use compiler::{BridgeNaming, ChainCompiler, SHARED_BRIDGE_FILE};
pub use error::{PipelineError, Result};
pub use graph::{Graph, StageId, DEFAULT_STAGING_DIR};
pub use pipeline::{BuiltPipeline, MapperDef, PipelineDef, StageDef};
pub use planner::{plan, Plan};
pub use readiness::is_ready;
pub use runner::{Orchestrator, RunState, RunSummary, Shell, SystemShell};
pub use settings::Settings;
pub use stage::Stage;
