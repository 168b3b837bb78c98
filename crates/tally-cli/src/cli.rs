use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use tally_core::node::{GoalScope, RecordingPolicy};
use tally_report::OutputFormat;

#[derive(Parser)]
#[command(name = "tally")]
#[command(version)]
#[command(about = "Word-count statistics for markdown vaults")]
pub struct Cli {
    /// Vault directory
    #[arg(long, global = true, default_value = ".")]
    pub vault: PathBuf,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile the saved state with the notes on disk
    Scan(FormatArgs),
    /// Word counts, goals and totals per folder and file
    Tree(FormatArgs),
    /// Recorded stat periods, one row each
    Stats(StatsArgs),
    /// Recount notes as tracked edits
    Update(UpdateArgs),
    /// Watch the vault and record edits as they happen
    Watch(WatchArgs),
    /// Set a word goal on a file or folder
    Goal(GoalArgs),
    /// Set or clear a display title
    Title(TitleArgs),
    /// Set a folder's recording policy
    Policy(PolicyArgs),
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommands),
    /// Print shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct FormatArgs {
    /// Output format (json, table, markdown, csv)
    #[arg(long, short, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct StatsArgs {
    /// Only periods ending at or after this RFC 3339 time
    #[arg(long)]
    pub since: Option<String>,

    /// Only files at or below this path
    #[arg(long)]
    pub path: Option<String>,

    #[command(flatten)]
    pub output: FormatArgs,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Vault-relative note paths
    #[arg(required = true)]
    pub paths: Vec<String>,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Seconds between state saves
    #[arg(long, default_value_t = 30)]
    pub save_interval: u64,

    /// Stop after this many seconds
    #[arg(long = "for", value_name = "SECONDS")]
    pub run_for: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ScopeArg {
    /// The file's or folder's own goal
    Own,
    /// Default for files below the folder
    Files,
    /// Default for folders below the folder
    Folders,
}

impl From<ScopeArg> for GoalScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Own => GoalScope::Own,
            ScopeArg::Files => GoalScope::Files,
            ScopeArg::Folders => GoalScope::Folders,
        }
    }
}

#[derive(Args)]
pub struct GoalArgs {
    /// Vault-relative path; empty for the vault root
    pub path: String,
    /// Goal in words; 0 clears it
    pub words: u64,
    #[arg(long, value_enum, default_value_t = ScopeArg::Own)]
    pub scope: ScopeArg,
}

#[derive(Args)]
pub struct TitleArgs {
    pub path: String,
    /// New title; omit to clear
    pub title: Option<String>,
}

#[derive(Args)]
pub struct PolicyArgs {
    /// Vault-relative folder path; empty for the vault root
    pub path: String,
    /// on, off, or inherit
    pub policy: RecordingPolicy,
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project from a folder, a tag, or an index note
    Create(ProjectCreateArgs),
    /// List projects with their word totals
    List(FormatArgs),
    /// List the files of one project
    Show(ProjectShowArgs),
    /// Rename a project
    Rename { name: String, new_name: String },
    /// Delete a project
    Delete { name: String },
}

#[derive(Args)]
#[group(required = true, multiple = false, id = "membership")]
pub struct MembershipArgs {
    /// Every note below this folder
    #[arg(long)]
    pub folder: Option<String>,
    /// Every note carrying this tag
    #[arg(long)]
    pub tag: Option<String>,
    /// Every note linked from this index note
    #[arg(long)]
    pub index: Option<String>,
}

#[derive(Args)]
pub struct ProjectCreateArgs {
    pub name: String,
    #[command(flatten)]
    pub membership: MembershipArgs,
}

#[derive(Args)]
pub struct ProjectShowArgs {
    pub name: String,
    #[command(flatten)]
    pub output: FormatArgs,
}

#[derive(Args)]
pub struct CompletionsArgs {
    pub shell: Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tally", "tree", "--vault", "/tmp/v", "-vv", "-f", "json"])
            .unwrap();
        assert_eq!(cli.vault, PathBuf::from("/tmp/v"));
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Tree(args) => assert_eq!(args.format, OutputFormat::Json),
            _ => panic!("expected tree"),
        }
    }

    #[test]
    fn project_create_needs_exactly_one_membership() {
        assert!(Cli::try_parse_from(["tally", "project", "create", "Book"]).is_err());
        assert!(Cli::try_parse_from([
            "tally", "project", "create", "Book", "--folder", "Book", "--tag", "x"
        ])
        .is_err());
        let cli =
            Cli::try_parse_from(["tally", "project", "create", "Book", "--tag", "draft"]).unwrap();
        match cli.command {
            Commands::Project(ProjectCommands::Create(args)) => {
                assert_eq!(args.membership.tag.as_deref(), Some("draft"));
            }
            _ => panic!("expected project create"),
        }
    }

    #[test]
    fn policy_and_scope_parse() {
        let cli = Cli::try_parse_from(["tally", "policy", "Drafts", "off"]).unwrap();
        match cli.command {
            Commands::Policy(args) => assert_eq!(args.policy, RecordingPolicy::Off),
            _ => panic!("expected policy"),
        }
        let cli =
            Cli::try_parse_from(["tally", "goal", "Book", "500", "--scope", "files"]).unwrap();
        match cli.command {
            Commands::Goal(args) => {
                assert_eq!(GoalScope::from(args.scope), GoalScope::Files);
                assert_eq!(args.words, 500);
            }
            _ => panic!("expected goal"),
        }
    }
}
