use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod drill;

use drlab_core::traits::ExecutionStore;
use drlab_core::{DbMode, DrConfig, FailoverMode};
use drlab_drivers::{HealthProber, HttpEndpointCheck};
use drlab_orchestrator::JsonFileExecutionStore;

#[derive(Parser, Debug)]
#[command(name = "drlab-failover")]
#[command(about = "drlab failover orchestration tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a failover drill against the in-memory site simulation
    Drill {
        /// Failover mode (planned or unplanned)
        #[arg(long, default_value = "planned")]
        mode: FailoverMode,

        /// Reason recorded on the execution
        #[arg(long, default_value = "operator drill")]
        reason: String,

        /// Database recovery path (replica or snapshot)
        #[arg(long, default_value = "replica")]
        db_mode: DbMode,

        /// Disable the replica-to-snapshot fallback
        #[arg(long, default_value = "false")]
        no_fallback: bool,

        /// Desired standby task count
        #[arg(long, default_value = "2")]
        task_count: u32,

        /// Directory for persisted execution records
        #[arg(long, env = "DRLAB_DATA_DIR", default_value = "./data/executions")]
        data_dir: String,

        /// Skip the interactive confirmation prompt
        #[arg(long, default_value = "false")]
        yes: bool,
    },

    /// Probe an endpoint and report consecutive failures
    Probe {
        /// Endpoint URL to probe (e.g. https://app.example.com/healthz)
        #[arg(long)]
        endpoint: String,

        /// Number of probes to run
        #[arg(long, default_value = "3")]
        count: u32,

        /// Delay between probes in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Per-probe timeout in milliseconds
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,
    },

    /// List persisted execution records, or dump one as JSON
    History {
        /// Directory holding execution records
        #[arg(long, env = "DRLAB_DATA_DIR", default_value = "./data/executions")]
        data_dir: String,

        /// Execution id to dump in full
        #[arg(long)]
        execution_id: Option<String>,
    },

    /// Generate a configuration file with every default documented
    GenerateConfig {
        /// Output configuration file path
        #[arg(long, default_value = "drlab.yaml")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Drill {
            mode,
            reason,
            db_mode,
            no_fallback,
            task_count,
            data_dir,
            yes,
        } => {
            if !yes {
                println!("⚠️  This drill runs a full failover execution (simulated site).");
                println!("Continue? (y/N)");
                let mut input = String::new();
                std::io::stdin().read_line(&mut input)?;
                if !input.trim().eq_ignore_ascii_case("y") {
                    println!("Aborted.");
                    return Ok(());
                }
            }

            let report =
                drill::run_drill(mode, &reason, db_mode, !no_fallback, task_count, &data_dir)
                    .await?;

            println!("{}", report.summary());
            println!("\nExecution record saved under: {data_dir}");

            if report.status != drlab_core::ExecutionStatus::Succeeded {
                std::process::exit(1);
            }

            Ok(())
        }

        Commands::Probe {
            endpoint,
            count,
            interval_ms,
            timeout_ms,
        } => {
            let config = {
                let mut config = DrConfig::default();
                config.probe.timeout_ms = timeout_ms;
                config.probe.poll_interval_ms = interval_ms;
                config
            };
            let prober = HealthProber::new(Arc::new(HttpEndpointCheck::new()), &config.probe);

            println!("📡 Probing {endpoint} ({count} probes)...\n");
            let mut last = None;
            for i in 1..=count {
                let verdict = prober.probe(&endpoint).await;
                println!(
                    "  probe {i}/{count}: {} (consecutive failures: {})",
                    if verdict.healthy { "healthy" } else { "UNHEALTHY" },
                    verdict.consecutive_failures
                );
                last = Some(verdict);
                if i < count {
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            }

            if let Some(verdict) = last {
                if verdict.is_down(config.probe.failure_threshold) {
                    println!(
                        "\n⚠️  Endpoint is down ({} consecutive failures ≥ threshold {})",
                        verdict.consecutive_failures, config.probe.failure_threshold
                    );
                    std::process::exit(1);
                }
            }

            Ok(())
        }

        Commands::History {
            data_dir,
            execution_id,
        } => {
            let store = JsonFileExecutionStore::new(&data_dir);

            if let Some(id) = execution_id {
                let id = id.parse()?;
                match store.load(id).await? {
                    Some(execution) => {
                        println!("{}", serde_json::to_string_pretty(&execution)?);
                    }
                    None => {
                        eprintln!("No record for execution {id}");
                        std::process::exit(1);
                    }
                }
                return Ok(());
            }

            let ids = store.list().await?;
            if ids.is_empty() {
                println!("No execution records under {data_dir}");
                return Ok(());
            }

            println!("Execution records ({}):", ids.len());
            for id in ids {
                if let Some(execution) = store.load(id).await? {
                    println!(
                        "  {}  {}  mode={}  started={}  steps={}",
                        execution.execution_id,
                        execution.status,
                        execution.mode,
                        execution.started_at.format("%Y-%m-%d %H:%M:%S"),
                        execution.step_history.len()
                    );
                }
            }

            Ok(())
        }

        Commands::GenerateConfig { output } => {
            println!("📝 Generating configuration template...");

            let template = r#"# drlab failover orchestrator configuration
# Values shown are the defaults; DRLAB__-prefixed environment variables
# override any field, e.g. DRLAB__PROBE__FAILURE_THRESHOLD=3

probe:
  timeout_ms: 5000           # per-probe request timeout
  poll_interval_ms: 1000     # delay between health/operation polls
  failure_threshold: 2       # consecutive failures before primary counts as down
  dns_interval_secs: 30      # DNS health-check cadence (informational)
  dns_failure_threshold: 3   # DNS health-check failure threshold (informational)

retry:
  recovery_attempts: 2       # whole-step retries for database recovery
  secret:
    max_attempts: 3          # secret rotation attempts
    initial_backoff_ms: 100
    max_backoff_ms: 5000
    backoff_multiplier: 2.0

budget:                      # per-step timeouts carved from the RTO target
  recover_secs: 900          # database promotion / snapshot restore
  scale_secs: 300            # standby scale-up wait
  route_secs: 120            # traffic switch
  checks_secs: 300           # post-failover checks
  overall_secs: 3600         # whole-execution ceiling

store:
  data_dir: ./data/executions  # one JSON audit record per execution
"#;

            std::fs::write(&output, template)?;
            println!("✅ Configuration template written to: {output}");
            println!("\nUse it with:");
            println!("  DRLAB_CONFIG={output} drlab-failover drill --mode planned");

            Ok(())
        }
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).init();
}
