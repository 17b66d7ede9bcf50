use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(short, long, env = "VCD_CONFIG")]
    pub config: Option<String>,

    /// vCloud Director host (e.g., vcd.example.com)
    #[arg(short = 'H', long, env = "VCD_HOST")]
    pub host: Option<String>,

    /// API port (default: scheme default)
    #[arg(short = 'p', long, env = "VCD_PORT")]
    pub port: Option<u16>,

    /// Organization to log in to (System for provider sessions)
    #[arg(short = 'o', long, env = "VCD_ORG")]
    pub org: Option<String>,

    /// User name
    #[arg(short = 'u', long, env = "VCD_USER")]
    pub user: Option<String>,

    /// Password
    #[arg(short = 'P', long, env = "VCD_PASSWORD", conflicts_with = "api_token")]
    pub password: Option<String>,

    /// Pre-issued bearer access token
    #[arg(short = 'T', long, env = "VCD_API_TOKEN")]
    pub api_token: Option<String>,

    /// API version sent in Accept headers
    #[arg(long, env = "VCD_API_VERSION")]
    pub api_version: Option<String>,

    /// Disable SSL verification (for self-signed certs)
    #[arg(short = 'k', long, env = "VCD_NO_VERIFY_SSL", default_value_t = false)]
    pub no_verify_ssl: bool,

    /// Sources to query, highest priority first (cloudapi, admin-query, query)
    #[arg(short = 's', long, env = "VCD_SOURCES", value_delimiter = ',')]
    pub sources: Option<Vec<String>>,

    /// Per-source timeout in seconds (0 disables)
    #[arg(long, env = "VCD_SOURCE_TIMEOUT_SECS")]
    pub source_timeout_secs: Option<u64>,

    /// Deduplication identity (name, name_and_container)
    #[arg(long, env = "VCD_IDENTITY_SCOPE")]
    pub identity_scope: Option<String>,

    /// Query sources one after another instead of concurrently
    #[arg(long, default_value_t = false)]
    pub sequential: bool,

    /// Return an empty result instead of an error when every source fails
    #[arg(long, default_value_t = false)]
    pub lenient: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'L', long, env = "VCD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable logging to a file
    #[arg(long, env = "VCD_LOG_FILE_ENABLE", default_value_t = false)]
    pub log_file_enable: bool,

    /// Log file directory
    #[arg(long, env = "VCD_LOG_DIR", default_value = ".")]
    pub log_dir: String,

    /// Log filename prefix
    #[arg(long, env = "VCD_LOG_FILENAME", default_value = "vcloud-mcp-rs.log")]
    pub log_filename: String,

    /// Log rotation strategy (daily, hourly, never)
    #[arg(long, env = "VCD_LOG_ROTATE", default_value = "daily")]
    pub log_rotate: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate shell completion scripts
    Completions {
        /// The shell to generate the script for
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Run a single aggregated query and print the result as JSON
    Query {
        /// Resource kind (vms, tasks, events, storage_profiles, catalogs)
        kind: String,

        /// Case-insensitive name substring
        #[arg(long)]
        name: Option<String>,

        /// Container name substring or container id
        #[arg(long)]
        container: Option<String>,

        /// Exact status value
        #[arg(long)]
        status: Option<String>,

        /// RFC 3339 lower bound on the record timestamp
        #[arg(long)]
        since: Option<String>,

        /// Maximum number of records
        #[arg(long)]
        limit: Option<usize>,
    },
}
