use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "docstore",
    about = "Inspect and edit a docstore data directory",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML config file; defaults apply if it does not exist
    #[arg(long, global = true, default_value = "docstore.toml")]
    pub config: PathBuf,

    /// Override the configured data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Kind {
    General,
    User,
    World,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Collection {
    Users,
    Worlds,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum KeyedKind {
    User,
    World,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print a whole document
    Show(ShowArgs),
    /// List stored user or world ids
    List(ListArgs),
    /// Print the value at a dotted path
    Get(GetArgs),
    /// Store a JSON value at a dotted path
    Set(SetArgs),
    /// Remove the value at a dotted path
    Remove(RemoveArgs),
    /// Delete a user or world document
    Delete(DeleteArgs),
}

#[derive(Args)]
pub struct ShowArgs {
    pub kind: Kind,
    pub id: Option<Uuid>,
}

#[derive(Args)]
pub struct ListArgs {
    pub collection: Collection,
}

/// `[id] <path>`
#[derive(Args)]
pub struct GetArgs {
    pub kind: Kind,
    #[arg(required = true, num_args = 1..=2, value_name = "[ID] PATH")]
    pub operands: Vec<String>,
}

/// `[id] <path> <json>`
#[derive(Args)]
pub struct SetArgs {
    pub kind: Kind,
    #[arg(
        required = true,
        num_args = 2..=3,
        allow_hyphen_values = true,
        value_name = "[ID] PATH JSON"
    )]
    pub operands: Vec<String>,
}

/// `[id] <path>`
#[derive(Args)]
pub struct RemoveArgs {
    pub kind: Kind,
    #[arg(required = true, num_args = 1..=2, value_name = "[ID] PATH")]
    pub operands: Vec<String>,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub kind: KeyedKind,
    pub id: Uuid,
}
