mod check;
mod serve;
mod synthesize;

use anyhow::Context;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use clap::Subcommand;
use sgls_conf::Settings;
use sgls_schema::Schema;

use crate::args::Args;
use crate::exit::Exit;

pub trait Command {
    fn execute(&self, args: &Args) -> Result<Exit>;
}

#[derive(Debug, Subcommand)]
pub enum SglsCommand {
    /// Start the LSP server
    Serve(self::serve::Serve),
    /// Check request documents against the schema
    Check(self::check::Check),
    /// Print the query document for a builder selection
    Synthesize(self::synthesize::Synthesize),
}

impl Command for SglsCommand {
    fn execute(&self, args: &Args) -> Result<Exit> {
        match self {
            SglsCommand::Serve(command) => command.execute(args),
            SglsCommand::Check(command) => command.execute(args),
            SglsCommand::Synthesize(command) => command.execute(args),
        }
    }
}

fn resolve_project_root() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|_| anyhow::anyhow!("Current directory is not valid UTF-8"))
}

fn load_settings(project_root: &Utf8Path) -> Result<Settings> {
    Settings::new(project_root.as_std_path()).context("Failed to load settings")
}

/// Load the schema named on the command line, or the configured one.
/// Relative paths resolve against the project root.
fn load_schema(explicit: Option<&str>, settings: &Settings, project_root: &Utf8Path) -> Result<Schema> {
    let location = explicit
        .or(settings.schema.as_deref())
        .context("No schema given; pass --schema or set `schema` in sgls.toml")?;

    let is_url = location.starts_with("http://") || location.starts_with("https://");
    let location = if !is_url && Utf8Path::new(location).is_relative() {
        project_root.join(location).into_string()
    } else {
        location.to_string()
    };

    let source = sgls_schema::schema_source(&location);
    let schema = source
        .load()
        .with_context(|| format!("Failed to load schema from {}", source.describe()))?;

    for issue in schema.integrity_issues() {
        tracing::warn!("schema issue: {issue}");
    }
    Ok(schema)
}
