// Copyright (c) 2025 - Cowboy AI, Inc.
//! Data Platform CLI
//!
//! Builds the platform stack for one environment from its stack file and
//! previews, validates or (dry-run) applies it.
//!
//! Run with: cargo run --bin data-platform -- --stack dev preview
//!
//! Secrets given as `secure:` ciphertext in the stack file can be supplied
//! in plaintext through `DATA_PLATFORM_MASTER_PASSWORD` and
//! `DATA_PLATFORM_HIVE_PASSWORD`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use data_platform_infra::bootstrap::{self, DryRunExecutor};
use data_platform_infra::keypair::{self, KeyPairRequest};
use data_platform_infra::registration::{self, Inventory, StaticInstanceDirectory};
use data_platform_infra::{
    build_stack, Deployment, DeploymentContext, DeploymentState, DryRunProvisioner, Environment,
    StackConfig,
};

#[derive(Debug, Parser)]
#[command(name = "data-platform", version, about = "Data platform infrastructure")]
struct Cli {
    /// Stack (environment) name
    #[arg(long, short, env = "DATA_PLATFORM_STACK", global = true, default_value = "dev")]
    stack: String,

    /// Stack file; defaults to Pulumi.<stack>.yaml
    #[arg(long, short, env = "DATA_PLATFORM_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Project name used for namespaced config keys and URNs
    #[arg(long, env = "DATA_PLATFORM_PROJECT", global = true, default_value = "data-platform")]
    project: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the ordered deployment plan as JSON
    Preview {
        /// Write the plan to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check every stack invariant
    Validate,
    /// Apply the stack through the dry-run provisioner
    Up {
        /// Account id used in fabricated ARNs
        #[arg(long, env = "AWS_ACCOUNT_ID", default_value = "123456789012")]
        account_id: String,

        /// JSON inventory of running cluster instances for target registration
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Discover cluster instances through EC2 instead of an inventory
        #[cfg(feature = "aws")]
        #[arg(long, conflicts_with = "inventory")]
        discover: bool,

        /// State written by an earlier run; its resources are not provisioned again
        #[arg(long)]
        state_in: Option<PathBuf>,

        /// Write the resulting outputs to a file
        #[arg(long)]
        state_out: Option<PathBuf>,
    },
    /// Create the environment's EC2 key pair with the AWS CLI
    Keygen {
        /// Directory receiving the key files
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Print (or run) the metastore bootstrap statements
    BootstrapDb {
        /// MySQL URL to run the statements against
        #[arg(long, env = "DATA_PLATFORM_DB_URL")]
        url: Option<String>,
    },
}

fn load_config(cli: &Cli, environment: &Environment) -> Result<StackConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("Pulumi.{}.yaml", environment)));
    let mut config = StackConfig::load(&cli.project, environment.clone(), &path)
        .with_context(|| format!("loading stack file {}", path.display()))?;

    config.secrets.master_password = config
        .secrets
        .master_password
        .or_env("DATA_PLATFORM_MASTER_PASSWORD");
    config.secrets.hive_password = config
        .secrets
        .hive_password
        .or_env("DATA_PLATFORM_HIVE_PASSWORD");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let environment = Environment::new(&cli.stack).context("invalid stack name")?;

    match &cli.command {
        Command::Keygen { out_dir } => {
            let request = KeyPairRequest::for_environment(&environment);
            let files = keypair::generate_key_pair(&request, out_dir)
                .await
                .context("generating key pair")?;
            println!("{}", files.info.display());
            println!("{}", files.private_key.display());
            return Ok(());
        }
        Command::BootstrapDb { url } => {
            let config = load_config(&cli, &environment)?;
            let statements = bootstrap::statements_for(&config.rds, &config.secrets.hive_password)
                .context("rendering bootstrap statements")?;
            match url {
                #[cfg(feature = "mysql")]
                Some(url) => {
                    let mut executor = bootstrap::MySqlExecutor::connect(url).await?;
                    bootstrap::run_bootstrap(&mut executor, &statements).await?;
                }
                #[cfg(not(feature = "mysql"))]
                Some(_) => anyhow::bail!("executing statements requires the `mysql` feature"),
                None => {
                    let mut executor = DryRunExecutor::new();
                    bootstrap::run_bootstrap(&mut executor, &statements).await?;
                    for statement in executor.executed() {
                        println!("{};", statement.redacted);
                    }
                }
            }
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(&cli, &environment)?;
    let ctx = DeploymentContext::new(&cli.project, environment.clone(), &config.region);
    let mut stack = build_stack(ctx, &config).context("declaring stack")?;
    stack.validate().context("validating stack")?;

    match cli.command {
        Command::Preview { output } => {
            let plan = stack.plan()?.to_json_pretty()?;
            match output {
                Some(path) => std::fs::write(&path, plan)
                    .with_context(|| format!("writing plan to {}", path.display()))?,
                None => println!("{}", plan),
            }
        }
        Command::Validate => {
            println!(
                "{}: {} resources, all invariants hold",
                environment,
                stack.graph.len()
            );
        }
        Command::Up {
            account_id,
            inventory,
            #[cfg(feature = "aws")]
            discover,
            state_in,
            state_out,
        } => {
            let deployment = Deployment::new().with_secrets(config.secrets.by_name());
            let mut provisioner = DryRunProvisioner::new(account_id, &config.region);
            let mut state = match state_in {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading state from {}", path.display()))?;
                    let state: DeploymentState = serde_json::from_str(&raw)
                        .with_context(|| format!("parsing state in {}", path.display()))?;
                    info!(resources = state.len(), path = %path.display(), "loaded previous state");
                    state
                }
                None => DeploymentState::new(),
            };
            deployment
                .apply(&stack.graph, &mut provisioner, &mut state)
                .await
                .context("applying stack")?;

            #[cfg(feature = "aws")]
            let discovered = if discover {
                let directory =
                    registration::Ec2InstanceDirectory::for_region(config.region.clone()).await;
                Some(registration::register_stack_targets(&directory, &mut stack, &state).await?)
            } else {
                None
            };
            #[cfg(not(feature = "aws"))]
            let discovered: Option<Vec<registration::RegistrationPlan>> = None;

            let plans = match (discovered, inventory) {
                (Some(plans), _) => Some(plans),
                (None, Some(path)) => {
                    let inventory = Inventory::load(&path)?;
                    let mut directory = StaticInstanceDirectory::new(inventory);
                    for cluster in stack.clusters.all() {
                        if let Some(id) = state.output_str(&cluster.cluster_id()) {
                            directory.alias(id, cluster.name.clone());
                        }
                    }
                    Some(registration::register_stack_targets(&directory, &mut stack, &state).await?)
                }
                (None, None) => {
                    warn!("no instance inventory given; cluster-backed target groups stay empty");
                    None
                }
            };

            if let Some(plans) = plans {
                for plan in &plans {
                    for stale in registration::stale_attachments(&state, plan) {
                        warn!(
                            attachment = %stale.key,
                            instance = %stale.instance_id,
                            "stale attachment left in place"
                        );
                    }
                }
                stack.validate().context("validating registered stack")?;
                let registered = deployment
                    .apply(&stack.graph, &mut provisioner, &mut state)
                    .await
                    .context("applying registrations")?;
                info!(resources = registered.len(), "registrations applied");
            }

            let rendered = serde_json::to_string_pretty(&state)?;
            match state_out {
                Some(path) => std::fs::write(&path, rendered)
                    .with_context(|| format!("writing state to {}", path.display()))?,
                None => println!("{}", rendered),
            }
            info!(resources = state.len(), "up complete");
        }
        Command::Keygen { .. } | Command::BootstrapDb { .. } => {}
    }

    Ok(())
}
