use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "jardex")]
#[command(about = "Index local Maven/Gradle dependency caches and query Java classes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "DIR")]
    pub maven: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub gradle: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub cfr: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub javap: Option<PathBuf>,

    /// Comma-separated package prefixes to index, e.g. "com.corp,org.internal".
    #[arg(long, value_name = "LIST")]
    pub packages: Option<String>,

    /// Version preference: semver, latest-published, or latest-used.
    #[arg(long, value_name = "NAME")]
    pub strategy: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Scan the configured roots and ingest anything unindexed.
    Index,
    /// Reset the index and rebuild it from scratch.
    Refresh,
    /// Index, then keep watching the roots for archive changes.
    Watch,
    /// Search classes by fragment, glob (*/?), or regex:<pattern>.
    Classes { query: String },
    /// Search artifacts by groupId/artifactId substring.
    Artifacts { query: String },
    /// Transitive subclasses and implementors of a class or interface.
    Implementations { class_name: String },
    /// Search resource definitions (e.g. .proto files) by path fragment.
    Resources { pattern: String },
    /// Per-class details: signatures, docs, or source.
    Detail {
        class_name: String,

        #[arg(short = 't', long = "type", value_enum, default_value_t = DetailType::Signatures)]
        detail_type: DetailType,

        /// Pin a coordinate "groupId:artifactId:version" instead of
        /// resolving the best artifact.
        #[arg(long, value_name = "GAV")]
        coordinate: Option<String>,
    },
    Stats,
    Clear,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum DetailType {
    Signatures,
    Docs,
    Source,
}
