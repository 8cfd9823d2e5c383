//! Dashboard assistant installer CLI.
//!
//! Installs the ML-Commons resources behind the dashboard assistant
//! (connector, model, agent) on a search cluster, and inspects what is
//! currently installed.

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use colored::Colorize;
use da_core::config::loader::load_config;
use da_core::config::models::AppConfig;
use da_core::config::providers::ProviderCatalog;
use da_core::engine::InstallationManager;
use da_core::monitor;
use da_core::repositories::mock::MockMlBackend;
use da_core::repositories::opensearch::OpenSearchClient;
use da_core::repositories::MlServices;
use da_protocol::config_models::ClusterConfig;
use da_protocol::installation_models::{ExecutionState, InstallRequest, InstallationResult};
use da_protocol::ipc::Event;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dashboard-assistant")]
#[command(about = "Install and inspect the dashboard assistant on a search cluster", long_about = None)]
#[command(version)]
struct Cli {
    /// Project root containing the `.dashboard-assistant/` directory
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(flatten)]
    cluster: ClusterArgs,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for the `[cluster]` section of config.toml.
#[derive(Args, Debug)]
struct ClusterArgs {
    /// Cluster REST endpoint
    #[arg(long, global = true)]
    url: Option<String>,

    /// Basic auth user name
    #[arg(long, global = true)]
    username: Option<String>,

    /// Basic auth password
    #[arg(long, global = true)]
    password: Option<String>,

    /// Accept self-signed certificates
    #[arg(long, global = true)]
    insecure: bool,
}

impl ClusterArgs {
    fn apply(self, mut config: ClusterConfig) -> ClusterConfig {
        if let Some(url) = self.url {
            config.url = url;
        }
        if self.username.is_some() {
            config.username = self.username;
        }
        if self.password.is_some() {
            config.password = self.password;
        }
        config.accept_invalid_certs |= self.insecure;
        config
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the connector, model and agent and make the agent active
    Install(InstallArgs),

    /// List the remote models on the cluster, or delete one
    Models(ModelsArgs),

    /// Show the agent the dashboard assistant currently uses
    Status,

    /// List the known model providers
    Providers,
}

#[derive(Args, Debug)]
struct ModelsArgs {
    #[command(subcommand)]
    action: Option<ModelsCommand>,
}

#[derive(Subcommand, Debug)]
enum ModelsCommand {
    /// Delete a model with its agents, connector and model group
    Delete {
        /// Model identifier, as listed by `models`
        id: String,
    },
}

#[derive(Args, Debug)]
struct InstallArgs {
    /// Provider name, as listed by `providers`
    #[arg(long)]
    provider: String,

    /// Model identifier at the provider
    #[arg(long)]
    model: String,

    /// Provider API base URL
    #[arg(long)]
    api_url: String,

    /// Provider API key
    #[arg(long)]
    api_key: String,

    /// Description stored with the model
    #[arg(long)]
    description: Option<String>,

    /// Run against an in-memory cluster instead of the configured one
    #[arg(long)]
    dry_run: bool,

    /// Print the full installation result as JSON
    #[arg(long)]
    json: bool,
}

impl InstallArgs {
    fn request(&self) -> InstallRequest {
        InstallRequest {
            selected_provider: self.provider.clone(),
            model_id: self.model.clone(),
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            description: self.description.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli.root)
        .await
        .wrap_err_with(|| format!("Failed to load configuration from {}", cli.root.display()))?;
    debug!(providers = config.providers.len(), "Configuration loaded");

    match cli.command {
        Command::Install(args) => install(config, cli.cluster, args).await,
        Command::Models(args) => match args.action {
            None => models(config, cli.cluster).await,
            Some(ModelsCommand::Delete { id }) => delete_model(config, cli.cluster, &id).await,
        },
        Command::Status => status(config, cli.cluster).await,
        Command::Providers => {
            providers(&config.providers);
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cluster_services(config: AppConfig, cluster: ClusterArgs) -> Result<Arc<MlServices>> {
    let cluster_config = cluster.apply(config.global.cluster);
    let client = OpenSearchClient::new(&cluster_config)
        .wrap_err_with(|| format!("Failed to create a client for {}", cluster_config.url))?;
    let delay = Duration::from_millis(config.global.installer.agent_propagation_delay_ms);

    Ok(Arc::new(
        MlServices::from_backend(Arc::new(client), Arc::new(config.providers))
            .with_agent_propagation_delay(delay),
    ))
}

async fn install(config: AppConfig, cluster: ClusterArgs, args: InstallArgs) -> Result<()> {
    let services = if args.dry_run {
        Arc::new(
            MlServices::from_backend(Arc::new(MockMlBackend::new()), Arc::new(config.providers))
                .with_agent_propagation_delay(Duration::ZERO),
        )
    } else {
        cluster_services(config, cluster)?
    };

    let installer = InstallationManager::new(services);
    let printer = (!args.json).then(|| spawn_progress_printer(installer.subscribe()));

    let result = installer.execute(&args.request()).await;

    // Closing the channel ends the printer once it has drained every event.
    drop(installer);
    if let Some(printer) = printer {
        printer.await?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    if result.success {
        Ok(())
    } else {
        Err(eyre!("{}", result.message))
    }
}

fn spawn_progress_printer(mut rx: broadcast::Receiver<Event>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seen: Vec<ExecutionState> = Vec::new();
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event, &mut seen),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Progress printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Print the step transitions carried by `event` that were not printed yet.
fn print_event(event: &Event, seen: &mut Vec<ExecutionState>) {
    match event {
        Event::InstallationStarted { step_count, .. } => {
            seen.clear();
            println!("{} ({step_count} steps)", "Installing dashboard assistant".bold());
        }
        Event::ProgressUpdated { progress, .. } => {
            seen.resize(progress.len(), ExecutionState::Pending);
            for (step, last) in progress.steps.iter().zip(seen.iter_mut()) {
                if step.state == *last {
                    continue;
                }
                *last = step.state;
                let message = step.message.as_deref().unwrap_or_default();
                match step.state {
                    ExecutionState::Running => println!("  {} {}", "…".cyan(), step.step_name),
                    ExecutionState::FinishedSuccessfully => {
                        println!("  {} {}", "✔".green(), message)
                    }
                    ExecutionState::FinishedWithWarnings => {
                        println!("  {} {}", "⚠".yellow(), message)
                    }
                    ExecutionState::Failed => {
                        println!("  {} {}: {}", "✘".red(), step.step_name, message.red())
                    }
                    ExecutionState::Pending => {}
                }
            }
        }
        Event::RollbackSucceeded { step, .. } => {
            println!("  {} rolled back {step}", "↺".yellow());
        }
        Event::RollbackFailed { step, message, .. } => {
            println!("  {} rollback of {step} failed: {message}", "!".red().bold());
        }
        Event::InstallationCompleted { .. } | Event::InstallationFailed { .. } => {}
    }
}

fn print_summary(result: &InstallationResult) {
    if result.success {
        println!("{}", result.message.green().bold());
        let data = &result.data;
        for (label, id) in [
            ("Connector", &data.connector_id),
            ("Model", &data.model_id),
            ("Agent", &data.agent_id),
        ] {
            if let Some(id) = id {
                println!("  {label:<10} {id}");
            }
        }
        return;
    }

    println!("{}", "Installation failed".red().bold());
    for error in result.errors.iter().flatten() {
        if let Some(details) = &error.details {
            for cause in &details.possible_causes {
                println!("  possible cause: {cause}");
            }
        }
    }
    if !result.data.is_empty() {
        println!("{}", "Resources left on the cluster:".yellow());
        for id in [
            &result.data.connector_id,
            &result.data.model_id,
            &result.data.agent_id,
        ]
        .into_iter()
        .flatten()
        {
            println!("  {id}");
        }
    }
}

async fn models(config: AppConfig, cluster: ClusterArgs) -> Result<()> {
    let services = cluster_services(config, cluster)?;
    let models = monitor::list_models(&services)
        .await
        .wrap_err("Failed to list models")?;

    if models.is_empty() {
        println!("No remote models found");
        return Ok(());
    }
    for model in models {
        let marker = if model.is_active_agent_model {
            "*".green().bold().to_string()
        } else {
            " ".to_string()
        };
        let agent = model.agent.as_ref().map_or("-", |agent| agent.name.as_str());
        println!(
            "{marker} {:<24} {:<32} {:<12} {}",
            model.id,
            model.name,
            model.state.as_deref().unwrap_or("-"),
            agent
        );
    }
    Ok(())
}

async fn delete_model(config: AppConfig, cluster: ClusterArgs, model_id: &str) -> Result<()> {
    let services = cluster_services(config, cluster)?;
    monitor::delete_model_with_related_entities(&services, model_id)
        .await
        .wrap_err_with(|| format!("Failed to delete model {model_id}"))?;
    println!("{} {model_id}", "Deleted model".green().bold());
    Ok(())
}

async fn status(config: AppConfig, cluster: ClusterArgs) -> Result<()> {
    let services = cluster_services(config, cluster)?;
    match monitor::active_agent(&services)
        .await
        .wrap_err("Failed to read the active agent")?
    {
        Some(agent) => {
            println!("{} {} ({})", "Active agent:".bold(), agent.name, agent.id);
            if let Some(model_id) = agent.model_id {
                println!("  model {model_id}");
            }
        }
        None => println!("No active dashboard assistant agent"),
    }
    Ok(())
}

fn providers(catalog: &ProviderCatalog) {
    for provider in catalog.iter() {
        println!("{}", provider.name.bold());
        for model in &provider.models {
            println!("  {model}");
        }
    }
}
