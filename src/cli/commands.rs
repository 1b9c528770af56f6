//! Command dispatch for the `treemodel` binary.

use std::io;
use std::path::Path;

use clap::CommandFactory;
use clap_complete::generate;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::application::ApplicationError;
use crate::cli::args::{Cli, Commands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::Settings;
use crate::domain::{NodeDatum, NodeState, NodeStore};
use crate::render::TreeRender;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    if let Commands::Completion { shell } = &cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let settings = Settings::load(cli.config.as_deref())?;
    debug!(?settings, "settings loaded");

    match &cli.command {
        Commands::Show {
            file,
            label,
            sort_by,
        } => cmd_show(&settings, file, label.as_deref(), sort_by.as_deref()),
        Commands::Stats { file } => cmd_stats(&settings, file),
        Commands::Config { template } => cmd_config(&settings, *template),
        Commands::Completion { .. } => Ok(()),
    }
}

/// Reads a JSON file of datums into a fresh, verified store.
#[instrument(level = "debug", skip(settings))]
pub fn load_store(settings: &Settings, path: &Path) -> CliResult<NodeStore> {
    let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let json_err = |source: serde_json::Error| CliError::Json {
        path: path.to_path_buf(),
        source,
    };
    let value: Value = serde_json::from_str(&content).map_err(json_err)?;
    let data = NodeDatum::list_from_value(value).map_err(json_err)?;

    let store = NodeStore::with_data(data, settings.default_state);
    store.verify().map_err(ApplicationError::from)?;
    Ok(store)
}

fn cmd_show(
    settings: &Settings,
    file: &Path,
    label: Option<&str>,
    sort_by: Option<&str>,
) -> CliResult<()> {
    let mut store = load_store(settings, file)?;
    if let Some(key) = sort_by {
        if key.is_empty() {
            return Err(CliError::InvalidArgs("--sort-by needs a key".into()));
        }
        store.sort(|a, b| a.label(key).cmp(&b.label(key)));
    }

    let label = label.unwrap_or(&settings.editable.data_key);
    output::info(&store.to_tree_string(label));
    Ok(())
}

fn cmd_stats(settings: &Settings, file: &Path) -> CliResult<()> {
    let store = load_store(settings, file)?;
    let root = store.root_id();
    let nodes = store.get_count() - 1;
    let leaves = store.iter().filter(|node| node.is_leaf()).count();
    let expanded = store
        .iter()
        .filter(|node| node.id() != root && node.state() == NodeState::Expanded)
        .count();

    output::header(&file.display());
    output::action("nodes", &nodes);
    output::action("depth", &store.get_last_depth());
    output::action("leaves", &leaves);
    output::action("expanded", &expanded);
    Ok(())
}

fn cmd_config(settings: &Settings, template: bool) -> CliResult<()> {
    if template {
        output::info(&Settings::template());
        return Ok(());
    }
    output::info(&settings.to_toml()?);
    Ok(())
}
