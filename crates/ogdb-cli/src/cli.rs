use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ogdb_format::FieldFormat;

#[derive(Parser)]
#[command(
    name = "ogdb",
    about = "Object-graph database slot inspector",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Decode the header of a raw object slot
    Header(HeaderArgs),
    /// Decode a raw schema slot
    Schema(SchemaArgs),
    /// Decode every field of an object slot against its schema slot
    Decode(DecodeArgs),
    /// List the slot formats this build can read
    Formats,
    /// Show the effective marshalling configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct HeaderArgs {
    /// File holding the slot bytes
    pub file: PathBuf,
    /// Also dump the slot as hex
    #[arg(long)]
    pub hex: bool,
}

#[derive(Args)]
pub struct SchemaArgs {
    /// File holding the schema slot bytes
    pub file: PathBuf,
    #[arg(long, value_enum, default_value = "v1")]
    pub field_format: FieldFormatArg,
}

#[derive(Args)]
pub struct DecodeArgs {
    /// File holding the schema slot of the object's class
    pub schema: PathBuf,
    /// File holding the object slot
    pub object: PathBuf,
    #[arg(long, value_enum, default_value = "v1")]
    pub field_format: FieldFormatArg,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// TOML file to load; defaults apply to every missing key
    pub file: Option<PathBuf>,
}

/// Generation of the field specs inside schema slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FieldFormatArg {
    V0,
    V1,
}

impl From<FieldFormatArg> for FieldFormat {
    fn from(arg: FieldFormatArg) -> Self {
        match arg {
            FieldFormatArg::V0 => FieldFormat::V0,
            FieldFormatArg::V1 => FieldFormat::V1,
        }
    }
}
