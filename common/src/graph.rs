use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

use crate::error::{PipelineError, Result};
use crate::stage::Stage;

/// Subdirectorio de staging que usa `add_mapper` si no se indica otro.
pub const DEFAULT_STAGING_DIR: &str = "somedir";

static NO_STAGES: BTreeSet<StageId> = BTreeSet::new();

/// Identificador opaco de un stage dentro de un `Graph`.
/// El orden de los ids es el orden de creación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId(usize);

impl StageId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Grafo de dependencias entre stages.
///
/// Para cada stage guarda sus padres (lo que debe terminar antes) y sus hijos
/// (quién consume su salida). Todo stage creado aparece en ambas tablas,
/// aunque sea con un conjunto vacío.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    stages: Vec<Stage>,
    parents: Vec<BTreeSet<StageId>>,
    children: Vec<BTreeSet<StageId>>,
    parallel: Option<u32>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /* ---------------- construcción ---------------- */

    /// Crea un stage nuevo, sin padres ni hijos.
    pub fn make_stage(&mut self, name: impl Into<String>) -> StageId {
        let id = StageId(self.stages.len());
        self.stages.push(Stage::new(name));
        self.parents.push(BTreeSet::new());
        self.children.push(BTreeSet::new());
        id
    }

    /// `consumer` lee la salida de `producer`.
    /// Repetir la misma arista no tiene efecto.
    pub fn input(&mut self, consumer: StageId, producer: StageId) -> Result<()> {
        self.check(consumer)?;
        self.check(producer)?;

        self.children[producer.0].insert(consumer);
        self.parents[consumer.0].insert(producer);
        Ok(())
    }

    /// Parte el trabajo de `reducer`: `mapper` hace sólo el map hacia el
    /// subdirectorio de staging por defecto y `reducer` sólo el reduce.
    pub fn add_mapper(&mut self, reducer: StageId, mapper: StageId) -> Result<()> {
        self.add_mapper_in(reducer, mapper, DEFAULT_STAGING_DIR)
    }

    /// Igual que `add_mapper` pero con un subdirectorio de staging explícito.
    pub fn add_mapper_in(&mut self, reducer: StageId, mapper: StageId, subdir: &str) -> Result<()> {
        self.check(reducer)?;
        self.check(mapper)?;

        // validamos antes de tocar nada, para no dejar el grafo a medias
        if self.stages[mapper.0].subdir().is_some() {
            return Err(PipelineError::DuplicateStaging(self.label(mapper)));
        }
        if let Some(existing) = self.stages[reducer.0].subdir() {
            if existing != subdir {
                return Err(PipelineError::DuplicateStaging(self.label(reducer)));
            }
        }

        self.stages[mapper.0].map_to_dir(subdir)?;
        self.stages[reducer.0].reduce_from_dir(subdir)?;
        self.input(reducer, mapper)
    }

    /// Paralelismo global. Sólo se aceptan enteros positivos.
    pub fn set_parallel(&mut self, jobs: i64) -> Result<()> {
        let jobs = u32::try_from(jobs)
            .ok()
            .filter(|j| *j >= 1)
            .ok_or(PipelineError::InvalidParallelism(jobs))?;
        self.parallel = Some(jobs);
        Ok(())
    }

    pub fn parallel(&self) -> Option<u32> {
        self.parallel
    }

    /// Copia el paralelismo global a los stages que no tienen uno propio.
    /// Un valor explícito por stage manda sobre el global.
    pub fn apply_parallelism(&mut self) {
        let Some(jobs) = self.parallel else {
            return;
        };
        for st in self.stages.iter_mut() {
            if st.parallelism.is_none() {
                st.parallelism = Some(jobs);
            }
        }
    }

    /* ---------------- consultas ---------------- */

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn contains(&self, id: StageId) -> bool {
        id.0 < self.stages.len()
    }

    /// Ids de todos los stages, en orden de creación.
    pub fn ids(&self) -> impl Iterator<Item = StageId> {
        (0..self.stages.len()).map(StageId)
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id.0)
    }

    pub fn stage_mut(&mut self, id: StageId) -> Option<&mut Stage> {
        self.stages.get_mut(id.0)
    }

    pub fn parents_of(&self, id: StageId) -> &BTreeSet<StageId> {
        self.parents.get(id.0).unwrap_or(&NO_STAGES)
    }

    pub fn children_of(&self, id: StageId) -> &BTreeSet<StageId> {
        self.children.get(id.0).unwrap_or(&NO_STAGES)
    }

    /// Nombre legible para logs y errores: `plugin#id`.
    pub fn label(&self, id: StageId) -> String {
        match self.stage(id) {
            Some(st) => format!("{}{}", st.name(), id),
            None => id.to_string(),
        }
    }

    fn check(&self, id: StageId) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(PipelineError::UnknownStage(id.to_string()))
        }
    }
}

#[cfg(test)]
impl StageId {
    pub(crate) fn raw(index: usize) -> Self {
        StageId(index)
    }
}
