use thiserror::Error;

/// Errores del pipeline: construcción del grafo, planificación y ejecución.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Una arista referencia un stage que no existe en el grafo.
    #[error("stage desconocido: {0}")]
    UnknownStage(String),

    /// Se intentó asignar un subdirectorio de staging dos veces al mismo stage.
    #[error("el stage {0} ya tiene un subdirectorio de staging (mapper agregado dos veces)")]
    DuplicateStaging(String),

    #[error("el paralelismo debe ser un entero positivo (recibido {0})")]
    InvalidParallelism(i64),

    /// El paralelismo global llegó como texto que no es un entero.
    #[error("el paralelismo debe ser un entero positivo (recibido {0:?})")]
    InvalidParallelismHint(String),

    /// El grafo no tiene ningún stage.
    #[error("nada que hacer: el pipeline no tiene stages")]
    NothingToDo,

    /// Una pasada completa del planificador no pudo marcar ningún stage nuevo.
    #[error("planificación estancada, stages pendientes: {}", .pending.join(", "))]
    PlanningStall { pending: Vec<String> },

    #[error("comando falló ({}): {command}", exit_label(.code))]
    StageExecution { command: String, code: Option<i32> },

    /// La definición del pipeline declara dos veces la misma clave de stage.
    #[error("stage duplicado en la definición: {0}")]
    DuplicateStageKey(String),

    #[error("definición de pipeline inválida: {0}")]
    Definition(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit {c}"),
        None => "terminado por señal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
