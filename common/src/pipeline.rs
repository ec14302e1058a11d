use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

use crate::error::{PipelineError, Result};
use crate::graph::{Graph, StageId};

/// Definición declarativa de un pipeline (JSON).
///
/// ```json
/// {
///   "parallel": 4,
///   "stages": [
///     { "id": "map1", "plugin": "wordcount" },
///     { "id": "reduce1", "plugin": "wordcount", "compression": false }
///   ],
///   "edges": [],
///   "mappers": [ { "reducer": "reduce1", "mapper": "map1", "subdir": "dirX" } ]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineDef {
    /// Paralelismo global (`-j`) para los stages sin valor propio.
    #[serde(default)]
    pub parallel: Option<i64>,

    pub stages: Vec<StageDef>,

    /// Aristas (productor, consumidor).
    #[serde(default)]
    pub edges: Vec<(String, String)>,

    #[serde(default)]
    pub mappers: Vec<MapperDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageDef {
    /// Clave única dentro de la definición.
    pub id: String,

    /// Plugin que ejecuta la herramienta; si falta se usa `id`.
    #[serde(default)]
    pub plugin: Option<String>,

    #[serde(default)]
    pub input_file: Option<String>,
    #[serde(default)]
    pub parallel: Option<i64>,
    #[serde(default)]
    pub compression: Option<bool>,
    #[serde(default)]
    pub buffer: Option<String>,
    #[serde(default)]
    pub files: Option<u32>,
}

/// `mapper` hace el map de `reducer` en el subdirectorio indicado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperDef {
    pub reducer: String,
    pub mapper: String,
    #[serde(default)]
    pub subdir: Option<String>,
}

/// Grafo construido y el mapeo clave -> id.
#[derive(Debug, Clone)]
pub struct BuiltPipeline {
    pub graph: Graph,
    pub ids: BTreeMap<String, StageId>,
}

impl PipelineDef {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Construye el grafo. Cualquier error corta la construcción completa.
    pub fn build(&self) -> Result<BuiltPipeline> {
        let mut graph = Graph::new();
        let mut ids: BTreeMap<String, StageId> = BTreeMap::new();

        if let Some(jobs) = self.parallel {
            graph.set_parallel(jobs)?;
        }

        for def in &self.stages {
            if ids.contains_key(&def.id) {
                return Err(PipelineError::DuplicateStageKey(def.id.clone()));
            }

            let plugin = def.plugin.clone().unwrap_or_else(|| def.id.clone());
            let id = graph.make_stage(plugin);

            let parallelism = match def.parallel {
                Some(jobs) if jobs >= 1 => Some(
                    u32::try_from(jobs).map_err(|_| PipelineError::InvalidParallelism(jobs))?,
                ),
                Some(jobs) => return Err(PipelineError::InvalidParallelism(jobs)),
                None => None,
            };

            if let Some(st) = graph.stage_mut(id) {
                st.input_file = def.input_file.clone();
                st.parallelism = parallelism;
                st.compression = def.compression;
                st.buffer_size = def.buffer.clone();
                st.file_count = def.files;
            }
            ids.insert(def.id.clone(), id);
        }

        let lookup = |key: &str| {
            ids.get(key)
                .copied()
                .ok_or_else(|| PipelineError::UnknownStage(key.to_string()))
        };

        for (producer, consumer) in &self.edges {
            let producer = lookup(producer)?;
            let consumer = lookup(consumer)?;
            graph.input(consumer, producer)?;
        }

        for m in &self.mappers {
            let reducer = lookup(&m.reducer)?;
            let mapper = lookup(&m.mapper)?;
            match &m.subdir {
                Some(dir) => graph.add_mapper_in(reducer, mapper, dir)?,
                None => graph.add_mapper(reducer, mapper)?,
            }
        }

        Ok(BuiltPipeline { graph, ids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DEFAULT_STAGING_DIR;
    use std::io::Write;
    use std::path::PathBuf;

    fn temp_dir(sub: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mrpipe_{}_{}", sub, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn from_json_con_campos_minimos() {
        let def = PipelineDef::from_json(r#"{ "stages": [ { "id": "wc" } ] }"#).unwrap();
        let built = def.build().unwrap();

        assert_eq!(built.graph.len(), 1);
        let id = built.ids["wc"];
        assert_eq!(built.graph.stage(id).unwrap().name(), "wc");
    }

    #[test]
    fn build_copia_opciones_del_stage() {
        let def = PipelineDef::from_json(
            r#"{
                "parallel": 3,
                "stages": [
                    { "id": "a", "plugin": "wordsort", "input_file": "in.txt",
                      "parallel": 8, "compression": false, "buffer": "1G", "files": 40 }
                ]
            }"#,
        )
        .unwrap();
        let built = def.build().unwrap();
        let st = built.graph.stage(built.ids["a"]).unwrap();

        assert_eq!(built.graph.parallel(), Some(3));
        assert_eq!(
            st.command_line("mapredo"),
            "mapredo -i 'in.txt' -j 8 --no-compression -b 1G -f 40 wordsort"
        );
    }

    #[test]
    fn aristas_van_de_productor_a_consumidor() {
        let def = PipelineDef::from_json(
            r#"{ "stages": [ {"id": "a"}, {"id": "b"} ], "edges": [["a", "b"]] }"#,
        )
        .unwrap();
        let built = def.build().unwrap();
        let (a, b) = (built.ids["a"], built.ids["b"]);

        assert!(built.graph.children_of(a).contains(&b));
        assert!(built.graph.parents_of(b).contains(&a));
    }

    #[test]
    fn arista_hacia_stage_desconocido_falla() {
        let def = PipelineDef::from_json(
            r#"{ "stages": [ {"id": "a"} ], "edges": [["fantasma", "a"]] }"#,
        )
        .unwrap();
        let err = def.build().unwrap_err();
        assert!(matches!(err, PipelineError::UnknownStage(ref k) if k == "fantasma"));
    }

    #[test]
    fn clave_duplicada_falla() {
        let def = PipelineDef::from_json(r#"{ "stages": [ {"id": "a"}, {"id": "a"} ] }"#).unwrap();
        assert!(matches!(
            def.build(),
            Err(PipelineError::DuplicateStageKey(ref k)) if k == "a"
        ));
    }

    #[test]
    fn paralelismo_por_stage_invalido_falla() {
        let def =
            PipelineDef::from_json(r#"{ "stages": [ {"id": "a", "parallel": 0} ] }"#).unwrap();
        assert!(matches!(
            def.build(),
            Err(PipelineError::InvalidParallelism(0))
        ));
    }

    #[test]
    fn mapper_sin_subdir_usa_el_default() {
        let def = PipelineDef::from_json(
            r#"{ "stages": [ {"id": "r"}, {"id": "m"} ],
                 "mappers": [ {"reducer": "r", "mapper": "m"} ] }"#,
        )
        .unwrap();
        let built = def.build().unwrap();
        let m = built.graph.stage(built.ids["m"]).unwrap();
        assert_eq!(m.subdir(), Some(DEFAULT_STAGING_DIR));
    }

    #[test]
    fn mapper_repetido_falla() {
        let def = PipelineDef::from_json(
            r#"{ "stages": [ {"id": "r1"}, {"id": "r2"}, {"id": "m"} ],
                 "mappers": [ {"reducer": "r1", "mapper": "m"},
                              {"reducer": "r2", "mapper": "m"} ] }"#,
        )
        .unwrap();
        assert!(matches!(
            def.build(),
            Err(PipelineError::DuplicateStaging(_))
        ));
    }

    #[test]
    fn json_invalido_es_error_de_definicion() {
        assert!(matches!(
            PipelineDef::from_json("{ no es json"),
            Err(PipelineError::Definition(_))
        ));
    }

    #[test]
    fn from_file_lee_desde_disco() {
        let dir = temp_dir("pipeline_file");
        let path = dir.join("pipeline.json");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, r#"{{ "stages": [ {{"id": "x"}}, {{"id": "y"}} ], "edges": [["x","y"]] }}"#)
            .unwrap();

        let def = PipelineDef::from_file(&path).unwrap();
        assert_eq!(def.stages.len(), 2);
        assert_eq!(def.edges, vec![("x".to_string(), "y".to_string())]);
    }

    #[test]
    fn from_file_inexistente_es_error_io() {
        let dir = temp_dir("pipeline_missing");
        assert!(matches!(
            PipelineDef::from_file(dir.join("no_existe.json")),
            Err(PipelineError::Io(_))
        ));
    }
}
