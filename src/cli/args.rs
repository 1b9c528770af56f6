//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

/// Inspect hierarchical tree data: render, count and check JSON node lists
#[derive(Parser, Debug)]
#[command(name = "treemodel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Turn debugging information on (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file (default: ./.treemodel.toml when present)
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the tree stored in a JSON file
    Show {
        /// JSON file holding a node datum or an array of datums
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Data key printed as node label (default: editable.data_key)
        #[arg(short, long)]
        label: Option<String>,

        /// Sort siblings by this data key before rendering
        #[arg(short, long)]
        sort_by: Option<String>,
    },

    /// Print node count, depth and leaf count
    Stats {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Show merged config
    Config {
        /// Print a commented template instead
        #[arg(short, long)]
        template: bool,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
