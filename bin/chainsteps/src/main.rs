//! chainsteps is a CLI tool to run ordered smart contract deployments from a manifest.

mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use chainsteps_deploy::{
    CONFIG_FILENAME, ConstructorArg, ProjectConfig, Registry, RpcDeployer, RunReport, Sequencer,
};
use cli::{Cli, Command, DeployArgs, ListArgs, RecordsArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config_path = PathBuf::from(&cli.config);

    match cli.command {
        Command::Init(args) => init(&config_path, args.force),
        Command::Deploy(args) => deploy(&config_path, args).await,
        Command::List(args) => list(&config_path, args),
        Command::Records(args) => records(&config_path, args),
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    let path = if path.is_dir() {
        path.join(CONFIG_FILENAME)
    } else {
        path.to_path_buf()
    };

    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Pass --force to overwrite it.",
            path.display()
        );
    }

    ProjectConfig::default().save_to_file(&path)
}

async fn deploy(config_path: &Path, args: DeployArgs) -> Result<()> {
    let config = ProjectConfig::load_from_file(config_path)?;
    let network_name = args
        .network
        .unwrap_or_else(|| config.default_network.clone());
    let network = config.network(&network_name)?;

    let deployer = RpcDeployer::new(&network.rpc_url, config.artifacts_dir())?
        .confirmation_timeout(network.confirmation_timeout());

    let chain_id = deployer
        .chain_id()
        .await
        .context(format!("Failed to reach {} at {}", network_name, network.rpc_url))?;
    if let Some(expected) = network.chain_id {
        if expected != chain_id {
            anyhow::bail!(
                "Network {} expects chain id {}, but {} reports {}",
                network_name,
                expected,
                network.rpc_url,
                chain_id
            );
        }
    }

    tracing::info!(
        network = %network_name,
        rpc_url = %network.rpc_url,
        chain_id,
        "Connected to network"
    );

    let accounts = network
        .named_accounts
        .resolve_with_node(deployer.client(), deployer.rpc_url())
        .await?;
    let mut registry = Registry::open(config.registry_dir(&network_name), Some(chain_id))?;

    let report = Sequencer::new(deployer, accounts)
        .address_source(network.address_source())
        .auto_mine(network.auto_mine)
        .run(&config.steps, &args.tags.filter(), &mut registry)
        .await?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    if report.outcomes.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Step", "Contract", "Address", "Status"]);
    for outcome in &report.outcomes {
        table.add_row(vec![
            outcome.name.clone(),
            outcome.contract.clone(),
            outcome.address.to_string(),
            outcome.status.to_string(),
        ]);
    }
    println!("{table}");
}

fn list(config_path: &Path, args: ListArgs) -> Result<()> {
    let config = ProjectConfig::load_from_file(config_path)?;
    let filter = args.tags.filter();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Step", "Contract", "Tags", "Args", "Selected"]);
    for (i, step) in config.steps.iter().enumerate() {
        let args = step
            .args
            .iter()
            .map(|arg| match arg {
                ConstructorArg::AddressOf { address_of } => format!("<{address_of}>"),
                ConstructorArg::Literal(value) => format!("{value:?}"),
            })
            .collect::<Vec<_>>()
            .join(", ");

        table.add_row(vec![
            (i + 1).to_string(),
            step.name.clone(),
            step.contract.clone(),
            step.tags.iter().cloned().collect::<Vec<_>>().join(", "),
            args,
            if filter.matches(step) { "yes" } else { "no" }.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn records(config_path: &Path, args: RecordsArgs) -> Result<()> {
    let config = ProjectConfig::load_from_file(config_path)?;
    let network_name = args
        .network
        .unwrap_or_else(|| config.default_network.clone());
    config.network(&network_name)?;

    let records = Registry::snapshot(&config.registry_dir(&network_name))?;
    if records.is_empty() {
        tracing::info!(network = %network_name, "No deployments recorded yet");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Step", "Contract", "Address", "Transaction", "Deployed at"]);
    for (name, record) in &records {
        table.add_row(vec![
            name.clone(),
            record.contract.clone(),
            record.address.to_string(),
            record.transaction_hash.clone().unwrap_or_else(|| "-".to_string()),
            record.deployed_at_rfc3339(),
        ]);
    }
    println!("{table}");
    Ok(())
}
