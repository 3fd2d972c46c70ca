use clap::{Args, Parser, Subcommand};
use chainsteps_deploy::{CONFIG_FILENAME, TagFilter};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "chainsteps")]
#[command(
    author,
    version,
    about = "Run ordered, dependency-aware smart contract deployments"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "CHAINSTEPS_VERBOSITY", default_value_t = LevelFilter::INFO, global = true)]
    pub verbosity: LevelFilter,

    /// Path to the project configuration file (or the directory holding it).
    #[arg(short, long, alias = "conf", env = "CHAINSTEPS_CONFIG", default_value = CONFIG_FILENAME, global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a default configuration file.
    Init(InitArgs),
    /// Run the deployment steps against a network.
    Deploy(DeployArgs),
    /// Show the deployment steps of the manifest.
    List(ListArgs),
    /// Show the deployment records of a network.
    Records(RecordsArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing configuration file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct TagArgs {
    /// Only run steps carrying one of these tags (comma separated).
    ///
    /// If not provided, every step runs.
    #[arg(short, long, value_delimiter = ',', env = "CHAINSTEPS_TAGS")]
    pub tags: Vec<String>,
}

impl TagArgs {
    pub fn filter(&self) -> TagFilter {
        TagFilter::new(self.tags.iter().map(|t| t.trim().to_string()))
    }
}

#[derive(Args)]
pub struct DeployArgs {
    /// The network to deploy to.
    ///
    /// If not provided, the configuration's `default_network` is used.
    #[arg(short, long, env = "CHAINSTEPS_NETWORK")]
    pub network: Option<String>,

    #[clap(flatten)]
    pub tags: TagArgs,
}

#[derive(Args)]
pub struct ListArgs {
    #[clap(flatten)]
    pub tags: TagArgs,
}

#[derive(Args)]
pub struct RecordsArgs {
    /// The network whose records to show.
    #[arg(short, long, env = "CHAINSTEPS_NETWORK")]
    pub network: Option<String>,
}
