//! Command-line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rescat::serialize::Format;
use rescat::MissingPolicy;

#[derive(Debug, Parser)]
#[command(name = "rescat", version, about = "Query, dump and check resource collections")]
pub struct Cli {
    /// Log debug output to stderr (RESCAT_LOG overrides).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML file listing transform and checker hook files.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Ignore hook files listed in RESCAT_TRANSFORMS and RESCAT_CHECKERS.
    #[arg(long, global = true)]
    pub no_environment_hooks: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print selected fields of each resource as CSV or shell arguments.
    Select(SelectArgs),
    /// Write the collection as JSON or source.
    Dump(DumpArgs),
    /// Validate resources with checker hooks.
    Check(CheckArgs),
    /// Show the hook environment variables.
    Env,
}

/// Arguments shared by every command that loads a collection.
#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Path, URL or `-`, optionally with a `#filter=...` fragment.
    pub location: String,

    /// Keep only resources matching the expression. Repeatable.
    #[arg(long = "filter", value_name = "EXPR")]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SelectFormat {
    Csv,
    Args,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Debug, Args)]
pub struct SelectArgs {
    #[command(flatten)]
    pub load: LoadArgs,

    /// `[KIND] [NAME] EXPR`; KIND is best, string, joined or json.
    #[arg(long = "field", num_args = 1..=3, value_names = ["KIND", "NAME", "EXPR"])]
    pub fields: Vec<Vec<String>>,

    /// Select every attribute found in the collection.
    #[arg(long, conflicts_with = "fields")]
    pub all_fields: bool,

    /// What a missing attribute does: default (null), error or skip.
    #[arg(long, default_value = "default", value_name = "POLICY")]
    pub missing: MissingPolicy,

    #[arg(long, value_enum, default_value_t = SelectFormat::Csv)]
    pub format: SelectFormat,

    /// CSV header row; on by default when more than one field is selected.
    #[arg(long, value_enum)]
    pub header: Option<Toggle>,

    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    #[command(flatten)]
    pub load: LoadArgs,

    /// json or source.
    #[arg(long, default_value = "json")]
    pub format: Format,

    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub load: LoadArgs,

    /// Checker hook file. Repeatable; runs after configured checkers.
    #[arg(long = "checker", value_name = "FILE")]
    pub checkers: Vec<PathBuf>,

    /// Print only the summary and problem details.
    #[arg(long, short)]
    pub quiet: bool,

    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fields_group_per_occurrence() {
        let cli = Cli::parse_from([
            "rescat", "select", "c.json", "--field", "path", "--field", "n", "reads * 2",
        ]);
        match cli.command {
            Command::Select(args) => {
                assert_eq!(args.fields, vec![vec!["path"], vec!["n", "reads * 2"]]);
                assert_eq!(args.missing, MissingPolicy::Default);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
