use serde::{Deserialize, Serialize};
use std::env;

use crate::compiler::BridgeNaming;
use crate::error::{PipelineError, Result};

pub const DEFAULT_TOOL: &str = "mapredo";
pub const DEFAULT_SHELL: &str = "sh";

/// Configuración de una corrida.
///
/// Variables de entorno (todas opcionales):
/// - `MAPREDO_BIN`: binario de la herramienta (default `mapredo`)
/// - `MRPIPE_SHELL`: shell con el que se lanza cada línea (default `sh`)
/// - `MRPIPE_BRIDGE`: `shared` para usar siempre `tmpfile.txt`
/// - `MRPIPE_PARALLEL`: paralelismo global
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub tool: String,
    pub shell: String,
    pub bridge: BridgeNaming,
    /// Imprimir cada comando en stderr antes de ejecutarlo.
    pub echo: bool,
    /// Paralelismo global; se valida al aplicarlo sobre el grafo.
    pub parallel: Option<i64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_string(),
            shell: DEFAULT_SHELL.to_string(),
            bridge: BridgeNaming::default(),
            echo: true,
            parallel: None,
        }
    }
}

impl Settings {
    /// Falla si `MRPIPE_PARALLEL` no es un entero positivo.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(tool) = lookup("MAPREDO_BIN").filter(|s| !s.trim().is_empty()) {
            settings.tool = tool;
        }
        if let Some(shell) = lookup("MRPIPE_SHELL").filter(|s| !s.trim().is_empty()) {
            settings.shell = shell;
        }
        if let Some(mode) = lookup("MRPIPE_BRIDGE") {
            settings.bridge = if mode.eq_ignore_ascii_case("shared") {
                BridgeNaming::Shared
            } else {
                BridgeNaming::PerStage
            };
        }
        if let Some(raw) = lookup("MRPIPE_PARALLEL") {
            let jobs = raw
                .trim()
                .parse::<i64>()
                .map_err(|_| PipelineError::InvalidParallelismHint(raw.clone()))?;
            if jobs < 1 {
                return Err(PipelineError::InvalidParallelism(jobs));
            }
            settings.parallel = Some(jobs);
        }

        Ok(settings)
    }
}
