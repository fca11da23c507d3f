use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sql2csv",
    version,
    about = "Run a SQL query and stream the result set to stdout as CSV"
)]
pub struct Cli {
    /// SQL query text
    #[arg(short = 'q', long, conflicts_with = "file")]
    pub query: Option<String>,

    /// Read the SQL query from a file
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Template variables as a JSON object, substituted into the query
    #[arg(long)]
    pub vars: Option<String>,

    /// Connection URI (postgres://, postgresql://, mysql:// or mariadb://)
    #[arg(long, env = "DATABASE_URI", hide_env_values = true)]
    pub database_uri: Option<String>,

    /// Path to config file
    #[arg(short = 'c', long, env = "SQL2CSV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Config file profile name
    #[arg(short = 'P', long, env = "SQL2CSV_PROFILE")]
    pub profile: Option<String>,

    /// Rows buffered between the query cursor and the CSV writer (default: 100)
    #[arg(short = 'b', long, env = "SQL2CSV_BUFFER")]
    pub buffer: Option<usize>,

    /// Fail on values that cannot be normalized instead of degrading them
    #[arg(long, env = "SQL2CSV_STRICT")]
    pub strict: bool,

    /// Skip the read-only query check
    #[arg(long)]
    pub skip_validation: bool,

    /// Emit diagnostics to stderr
    #[arg(short = 'v', long, env = "SQL2CSV_VERBOSE")]
    pub verbose: bool,

    /// Disable credential masking in diagnostics
    #[arg(long, env = "SQL2CSV_SHOW_SECRETS")]
    pub show_secrets: bool,
}
