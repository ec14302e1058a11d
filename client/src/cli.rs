use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{
    BridgeNaming, Graph, Orchestrator, PipelineDef, PipelineError, Plan, Settings, StageId,
};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Planifica y ejecuta pipelines de mapredo")]
struct Cli {
    /// Binario de la herramienta (sobreescribe MAPREDO_BIN)
    #[arg(long, global = true)]
    tool: Option<String>,

    /// Paralelismo global (sobreescribe MRPIPE_PARALLEL y el de la definición)
    #[arg(short = 'j', long = "parallel", global = true, allow_negative_numbers = true)]
    parallel: Option<i64>,

    /// Usar siempre tmpfile.txt como archivo puente
    #[arg(long, global = true)]
    shared_bridge: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Muestra la cola de comandos sin ejecutar nada
    Plan {
        #[arg(value_name = "PIPELINE_JSON")]
        file: PathBuf,

        /// Salida en JSON
        #[arg(long)]
        json: bool,
    },
    /// Planifica y ejecuta la cola, cortando en el primer fallo
    Run {
        #[arg(value_name = "PIPELINE_JSON")]
        file: PathBuf,

        /// Sólo imprime los comandos
        #[arg(long)]
        dry_run: bool,

        /// Resumen de la corrida en JSON
        #[arg(long)]
        json: bool,
    },
    /// Lista los stages con sus padres e hijos
    Show {
        #[arg(value_name = "PIPELINE_JSON")]
        file: PathBuf,
    },
}

fn load_graph(path: &Path) -> Result<Graph> {
    let def = PipelineDef::from_file(path)
        .with_context(|| format!("no se pudo leer el pipeline {}", path.display()))?;
    let built = def.build().context("pipeline inválido")?;
    info!(
        "pipeline {} cargado: {} stages",
        path.display(),
        built.graph.len()
    );
    Ok(built.graph)
}

fn print_plan(plan: &Plan, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(plan)?);
    } else {
        for cmd in &plan.commands {
            println!("{}", cmd);
        }
    }
    Ok(())
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env().context("configuración inválida")?;
    if let Some(tool) = cli.tool {
        settings.tool = tool;
    }
    if let Some(jobs) = cli.parallel {
        settings.parallel = Some(jobs);
    }
    if cli.shared_bridge {
        settings.bridge = BridgeNaming::Shared;
    }

    match cli.command {
        Commands::Plan { file, json } => {
            let mut graph = load_graph(&file)?;
            let plan = common::plan(&mut graph, &settings)?;
            print_plan(&plan, json)?;
        }

        Commands::Run {
            file,
            dry_run,
            json,
        } => {
            let mut graph = load_graph(&file)?;

            if dry_run {
                let plan = common::plan(&mut graph, &settings)?;
                print_plan(&plan, json)?;
                return Ok(());
            }

            // los procesos bloquean: corremos la cola fuera del runtime async
            let handle = tokio::task::spawn_blocking(move || {
                let mut orch = Orchestrator::with_system_shell(settings);
                let outcome = orch.run(&mut graph).map(|_| ());
                (orch.summary().clone(), outcome)
            });
            let (summary, outcome) = handle.await.context("el hilo de ejecución falló")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }

            match outcome {
                Ok(()) => {
                    info!("corrida terminada: {} comandos", summary.executed);
                }
                Err(e) => {
                    error!("{}", e);
                    if let PipelineError::StageExecution { command, .. } = &e {
                        eprintln!("Comando fallido: {}", command);
                    }
                    std::process::exit(1);
                }
            }
        }

        Commands::Show { file } => {
            let graph = load_graph(&file)?;
            let tool = settings.tool.as_str();
            for id in graph.ids() {
                let Some(stage) = graph.stage(id) else {
                    continue;
                };
                let labels = |ids: Vec<StageId>| {
                    ids.into_iter()
                        .map(|i| graph.label(i))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                println!("Stage {}", graph.label(id));
                println!("  comando : {}", stage.command_line(tool));
                println!(
                    "  padres  : {}",
                    labels(graph.parents_of(id).iter().copied().collect())
                );
                println!(
                    "  hijos   : {}",
                    labels(graph.children_of(id).iter().copied().collect())
                );
                println!();
            }
        }
    }

    Ok(())
}
