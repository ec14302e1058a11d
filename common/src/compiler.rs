use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{PipelineError, Result};
use crate::graph::{Graph, StageId};

/// Nombre fijo del archivo puente en modo compartido.
pub const SHARED_BRIDGE_FILE: &str = "tmpfile.txt";

/// Cómo se nombra el archivo intermedio de un fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeNaming {
    /// Un único `tmpfile.txt` para todos los fan-outs de la corrida.
    /// Dos fan-outs en el mismo pipeline se pisan el archivo.
    Shared,
    /// Un archivo por stage productor: `tmpfile-<plugin>-<id>.txt`.
    #[default]
    PerStage,
}

impl BridgeNaming {
    pub fn path_for(&self, graph: &Graph, producer: StageId) -> String {
        match self {
            BridgeNaming::Shared => SHARED_BRIDGE_FILE.to_string(),
            BridgeNaming::PerStage => {
                let name = graph.stage(producer).map(|s| s.name()).unwrap_or("stage");
                format!("tmpfile-{}-{}.txt", file_safe(name), producer.index())
            }
        }
    }
}

// sólo caracteres que no necesitan comillas en el shell
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Convierte un stage listo (y su cadena lineal de descendientes) en una
/// sola línea de shell.
#[derive(Debug, Clone)]
pub struct ChainCompiler {
    tool: String,
    bridge: BridgeNaming,
}

impl ChainCompiler {
    pub fn new(tool: impl Into<String>, bridge: BridgeNaming) -> Self {
        Self {
            tool: tool.into(),
            bridge,
        }
    }

    /// Compila `stage` y todo lo que cuelga de él en línea recta:
    ///   - sin hijos: el comando del stage.
    ///   - un hijo: `stage | hijo | ...`, siguiendo la cadena.
    ///   - dos o más hijos: `stage > puente`, y cada hijo pasa a leer del
    ///     puente con `-i`. Los hijos se compilan después, cada uno por su lado.
    ///
    /// Cada stage recorrido queda en `done`. Sólo se debe llamar sobre stages
    /// que `is_ready` aceptó.
    pub fn compile(
        &self,
        graph: &mut Graph,
        stage: StageId,
        done: &mut BTreeSet<StageId>,
    ) -> Result<String> {
        let mut segments: Vec<String> = Vec::new();
        let mut current = stage;

        loop {
            let own = graph
                .stage(current)
                .map(|st| st.command_line(&self.tool))
                .ok_or_else(|| PipelineError::UnknownStage(current.to_string()))?;

            if !done.insert(current) {
                // la cadena volvió sobre un stage ya compilado
                break;
            }

            let children: Vec<StageId> = graph.children_of(current).iter().copied().collect();
            match children.as_slice() {
                [] => {
                    segments.push(own);
                    break;
                }
                [only] => {
                    segments.push(own);
                    current = *only;
                }
                many => {
                    let bridge = self.bridge.path_for(graph, current);
                    segments.push(format!("{} > {}", own, bridge));
                    for child in many {
                        if let Some(st) = graph.stage_mut(*child) {
                            st.input_file = Some(bridge.clone());
                        }
                    }
                    break;
                }
            }
        }

        Ok(segments.join(" | "))
    }
}
