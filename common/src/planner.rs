use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::compiler::ChainCompiler;
use crate::error::{PipelineError, Result};
use crate::graph::{Graph, StageId};
use crate::readiness::is_ready;
use crate::settings::Settings;

/// Resultado de planificar: líneas de shell en el orden en que se deben correr.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub commands: Vec<String>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Planifica la corrida completa del grafo.
///
/// 1. Aplica el paralelismo global (el de `settings` manda sobre el del grafo).
/// 2. Mantiene una frontera de stages con todos los padres terminados, en
///    orden de creación. Cada stage listo se compila junto con su cadena
///    lineal; los que todavía no están listos esperan a que haya progreso.
/// 3. Si la frontera se vacía con stages pendientes (ciclo o join que nunca
///    se resuelve) devuelve `PlanningStall` sin haber ejecutado nada.
pub fn plan(graph: &mut Graph, settings: &Settings) -> Result<Plan> {
    if let Some(jobs) = settings.parallel {
        graph.set_parallel(jobs)?;
    }
    graph.apply_parallelism();

    if graph.is_empty() {
        return Err(PipelineError::NothingToDo);
    }

    let compiler = ChainCompiler::new(settings.tool.clone(), settings.bridge);
    let mut done: BTreeSet<StageId> = BTreeSet::new();
    let mut commands = Vec::new();

    let mut frontier: BTreeSet<StageId> = graph
        .ids()
        .filter(|id| graph.parents_of(*id).is_empty())
        .collect();
    let mut parked: BTreeSet<StageId> = BTreeSet::new();

    while let Some(id) = frontier.pop_first() {
        if done.contains(&id) {
            continue;
        }
        if !is_ready(graph, None, id, &done) {
            parked.insert(id);
            continue;
        }

        let before = done.clone();
        let cmd = compiler.compile(graph, id, &mut done)?;
        debug!("compilado {}: {}", graph.label(id), cmd);
        commands.push(cmd);

        // hubo progreso: lo que esperaba se vuelve a evaluar
        frontier.append(&mut parked);

        for finished in done.difference(&before) {
            for child in graph.children_of(*finished) {
                if !done.contains(child) && parents_done(graph, *child, &done) {
                    frontier.insert(*child);
                }
            }
        }
    }

    if done.len() < graph.len() {
        let pending: Vec<String> = graph
            .ids()
            .filter(|id| !done.contains(id))
            .map(|id| graph.label(id))
            .collect();
        warn!("planificación estancada con {} stages pendientes", pending.len());
        return Err(PipelineError::PlanningStall { pending });
    }

    info!(
        "plan listo: {} stages en {} comandos",
        graph.len(),
        commands.len()
    );
    Ok(Plan { commands })
}

fn parents_done(graph: &Graph, id: StageId, done: &BTreeSet<StageId>) -> bool {
    graph.parents_of(id).iter().all(|p| done.contains(p))
}
