use clap::Parser;
use codeloop::agent::{AgentConfig, CodeAgent};
use codeloop::brain::{Brain, BrainConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Solve a task by letting a model write and run sandboxed scripts
#[derive(Parser, Debug)]
#[command(name = "codeloop", version, about)]
struct Args {
    /// Task description handed to the model
    task: String,

    /// TOML file with agent configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the step budget
    #[arg(long)]
    max_steps: Option<u32>,

    /// Override the per-step wall-clock limit, in seconds
    #[arg(long)]
    timeout: Option<f64>,
}

fn load_config(args: &Args) -> Result<AgentConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::from_toml_file(path)?,
        None => AgentConfig::from_env()?,
    };
    if let Some(max_steps) = args.max_steps {
        config.limits.max_steps = max_steps;
    }
    if let Some(timeout) = args.timeout {
        config.limits.timeout_seconds = timeout;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let agent_config = load_config(&args)?;
    let brain_config = BrainConfig::from_env()?;

    info!(
        model = %brain_config.default_model,
        max_steps = agent_config.limits.max_steps,
        timeout_secs = agent_config.limits.timeout_seconds,
        "Configuration loaded"
    );

    let brain = Brain::new(brain_config)?;
    let agent = CodeAgent::new(brain, agent_config)?;

    match agent.run(&args.task).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            process::exit(1);
        }
    }
}
