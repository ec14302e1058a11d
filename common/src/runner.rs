use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{io, process::Command};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::graph::Graph;
use crate::planner::{self, Plan};
use crate::settings::Settings;

/// Lanza una línea de shell y espera a que termine.
pub trait Shell {
    /// Devuelve el código de salida, o `None` si el proceso murió por una señal.
    fn run(&mut self, command: &str) -> io::Result<Option<i32>>;
}

/// Ejecuta cada línea con `<shell> -c <línea>`.
#[derive(Debug, Clone)]
pub struct SystemShell {
    program: String,
}

impl SystemShell {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Shell for SystemShell {
    fn run(&mut self, command: &str) -> io::Result<Option<i32>> {
        let status = Command::new(&self.program).arg("-c").arg(command).status()?;
        Ok(status.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Planning,
    Executing,
    Succeeded,
    Failed,
}

/// Resumen de una corrida, se puede volcar como JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: RunState,
    /// Cola de comandos planificada.
    pub commands: Vec<String>,
    /// Cuántos comandos llegaron a lanzarse.
    pub executed: usize,
    pub failed_command: Option<String>,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            status: RunState::Planning,
            commands: Vec::new(),
            executed: 0,
            failed_command: None,
            exit_code: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Orquestador de una corrida: planifica el grafo y ejecuta la cola en orden,
/// un proceso por línea, cortando en el primer código de salida distinto de cero.
pub struct Orchestrator<S: Shell> {
    settings: Settings,
    shell: S,
    summary: RunSummary,
}

impl Orchestrator<SystemShell> {
    /// Orquestador con el shell del sistema indicado en `settings`.
    pub fn with_system_shell(settings: Settings) -> Self {
        let shell = SystemShell::new(settings.shell.clone());
        Self::new(settings, shell)
    }
}

impl<S: Shell> Orchestrator<S> {
    pub fn new(settings: Settings, shell: S) -> Self {
        Self {
            settings,
            shell,
            summary: RunSummary::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.summary.status
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    /// Planificación sola (sin ejecutar nada).
    pub fn plan(&mut self, graph: &mut Graph) -> Result<Plan> {
        // cada planificación abre una corrida nueva
        self.summary = RunSummary::new();
        match planner::plan(graph, &self.settings) {
            Ok(plan) => {
                self.summary.commands = plan.commands.clone();
                Ok(plan)
            }
            Err(e) => {
                self.finish(RunState::Failed);
                Err(e)
            }
        }
    }

    /// Ejecuta una cola ya planificada, en orden.
    pub fn execute(&mut self, plan: &Plan) -> Result<()> {
        // si no se acaba de planificar, la corrida anterior ya terminó
        if self.summary.status != RunState::Planning {
            self.summary = RunSummary::new();
        }
        self.summary.status = RunState::Executing;
        self.summary.commands = plan.commands.clone();

        for cmd in &plan.commands {
            if self.settings.echo {
                eprintln!("{}", cmd);
            }

            let code = match self.shell.run(cmd) {
                Ok(code) => code,
                Err(e) => {
                    warn!("no se pudo lanzar el comando: {}", e);
                    self.summary.failed_command = Some(cmd.clone());
                    self.finish(RunState::Failed);
                    return Err(PipelineError::Io(e));
                }
            };
            self.summary.executed += 1;

            if code != Some(0) {
                warn!("comando falló con {:?}, se corta la cola", code);
                self.summary.failed_command = Some(cmd.clone());
                self.summary.exit_code = code;
                self.finish(RunState::Failed);
                return Err(PipelineError::StageExecution {
                    command: cmd.clone(),
                    code,
                });
            }
        }

        self.summary.exit_code = Some(0);
        self.finish(RunState::Succeeded);
        info!("corrida completa: {} comandos", self.summary.executed);
        Ok(())
    }

    /// Planifica y ejecuta.
    pub fn run(&mut self, graph: &mut Graph) -> Result<&RunSummary> {
        let plan = self.plan(graph)?;
        self.execute(&plan)?;
        Ok(&self.summary)
    }

    fn finish(&mut self, state: RunState) {
        self.summary.status = state;
        self.summary.finished_at = Some(Utc::now());
    }
}
