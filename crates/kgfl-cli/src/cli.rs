use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "kgfl")]
#[command(about = "KGFL CLI: browse and edit league data from the terminal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API base URL (overrides profile and KGFL_URL env var)
    #[arg(short, long, global = true, env = "KGFL_URL")]
    pub server: Option<String>,

    /// Config profile name
    #[arg(short, long, global = true, env = "KGFL_PROFILE", default_value = "default")]
    pub profile: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Layered settings file (TOML, KGFL__* env vars override it)
    #[arg(long, global = true, env = "KGFL_CONFIG")]
    pub config: Option<String>,

    /// Log level (overrides settings; RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum, Default, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store credentials for this profile
    Login(LoginArgs),
    /// Forget stored credentials
    Logout,
    /// Restore the stored session and show who it belongs to
    Whoami,
    /// Read a league resource (clubs, table, top-scorers, ...) or a raw API path
    Get(GetArgs),
    /// Send a write and announce what it changed
    Send(SendArgs),
    /// Manage CLI configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct LoginArgs {
    /// Username
    #[arg(short, long)]
    pub username: String,
    /// Password
    #[arg(long, env = "KGFL_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(clap::Args)]
pub struct GetArgs {
    /// Resource name or API path (e.g. clubs, table, /players/9/stats/)
    pub target: String,
    /// Extra query parameters as key=value pairs
    pub params: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum WriteMethod {
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(clap::Args)]
pub struct SendArgs {
    /// HTTP method
    pub method: WriteMethod,
    /// API path (e.g. /matches/42/add_goal/)
    pub path: String,
    /// Path to JSON body (reads from stdin if omitted; ignored for delete)
    #[arg(long)]
    pub file: Option<String>,
    /// Entity kinds to invalidate in addition to the one inferred from the path
    #[arg(short, long, value_delimiter = ',')]
    pub invalidate: Vec<String>,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current config
    Show,
    /// Set config value
    Set(ConfigSetArgs),
}

#[derive(clap::Args)]
pub struct ConfigSetArgs {
    /// Key to set (server, format)
    pub key: String,
    /// Value
    pub value: String,
}
