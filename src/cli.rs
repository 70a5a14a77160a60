use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "gwas-embed",
    version,
    about = "Keep GWAS catalog study embeddings in sync with the catalog"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed catalog records that have no stored vector yet, or restore a local copy.
    Sync(SyncArgs),
    /// Report catalog, embedded and pending row counts.
    Status(StatusArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum BackendArg {
    Sqlite,
    Postgres,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum VectorizerKind {
    LocalHash,
    Http,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Defaults to postgres when a connection string is available.
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    #[arg(long, env = "GWAS_DB_PATH", default_value = "localdata/gwas_catalog.sqlite")]
    pub db_path: PathBuf,

    #[arg(long, env = "POSTGRES_DB", hide_env_values = true)]
    pub postgres_url: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(long, default_value_t = 512)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1000)]
    pub upload_batch_size: usize,

    #[arg(long, default_value_t = 512)]
    pub dimensions: usize,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, conflicts_with = "load_local")]
    pub save_local: Option<PathBuf>,

    #[arg(long)]
    pub load_local: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = VectorizerKind::LocalHash)]
    pub vectorizer: VectorizerKind,

    #[arg(long, env = "EMBEDDING_ENDPOINT")]
    pub embedding_endpoint: Option<String>,

    #[arg(long, default_value = "nomic-ai/nomic-embed-text-v1.5")]
    pub embedding_model: String,

    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    pub embedding_api_key: Option<String>,

    #[arg(long, default_value_t = 768)]
    pub native_dimensions: usize,

    #[arg(long, default_value_t = 120)]
    pub request_timeout_secs: u64,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Commands, VectorizerKind};

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_defaults_match_the_documented_values() {
        let cli = Cli::try_parse_from(["gwas-embed", "sync", "--db-path", "catalog.sqlite"])
            .expect("parses");
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };

        assert_eq!(args.batch_size, 512);
        assert_eq!(args.upload_batch_size, 1000);
        assert_eq!(args.dimensions, 512);
        assert_eq!(args.native_dimensions, 768);
        assert_eq!(args.vectorizer, VectorizerKind::LocalHash);
        assert_eq!(args.embedding_model, "nomic-ai/nomic-embed-text-v1.5");
    }

    #[test]
    fn save_and_load_local_are_mutually_exclusive() {
        let parsed = Cli::try_parse_from([
            "gwas-embed",
            "sync",
            "--save-local",
            "a.json.zst",
            "--load-local",
            "b.json.zst",
        ]);
        assert!(parsed.is_err());
    }
}
