use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use sgls_builder::synthesize;
use sgls_builder::Path;
use sgls_builder::SelectionState;
use sgls_builder::SynthesisOptions;

use crate::args::Args;
use crate::commands::load_schema;
use crate::commands::load_settings;
use crate::commands::resolve_project_root;
use crate::commands::Command;
use crate::exit::Exit;

/// Nested nodes are addressed by their relation chain from the root, so
/// `--field owned_properties.owner:name` selects `name` two levels down.
#[derive(Debug, Parser)]
pub struct Synthesize {
    /// Schema file or URL. Defaults to `schema` from the settings.
    #[arg(long)]
    schema: Option<String>,

    /// Root entity of the query.
    #[arg(long)]
    entity: String,

    /// Field to select, optionally prefixed with `relation.chain:`.
    #[arg(long = "field", value_name = "FIELD")]
    fields: Vec<String>,

    /// Filter as `key=value`; the value is JSON when it parses as JSON.
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    filters: Vec<String>,

    /// Row limit of the root query.
    #[arg(long)]
    limit: Option<u64>,

    /// Row offset of the root query.
    #[arg(long)]
    offset: Option<u64>,
}

impl Command for Synthesize {
    fn execute(&self, _args: &Args) -> Result<Exit> {
        let project_root = resolve_project_root()?;
        let settings = load_settings(&project_root)?;
        let schema = load_schema(self.schema.as_deref(), &settings, &project_root)?;

        let state = self.selection()?;
        let options = SynthesisOptions {
            default_limit: Some(u64::from(settings.default_limit)),
        };

        let Some(document) = synthesize(Some(&self.entity), &state, &schema, &options) else {
            return Ok(Exit::error().with_message(format!(
                "Unknown entity '{}'",
                self.entity
            )));
        };

        println!("{}", serde_json::to_string_pretty(&document)?);
        Ok(Exit::success())
    }
}

impl Synthesize {
    fn selection(&self) -> Result<SelectionState> {
        let root = Path::root(&self.entity);
        let mut state = SelectionState::new();

        for arg in &self.fields {
            let (path, field) = target(&root, arg);
            expand_chain(&mut state, &path);
            state.select_field(&path, field);
        }

        for arg in &self.filters {
            let (path, filter) = target(&root, arg);
            let (key, value) = parse_filter(filter)?;
            expand_chain(&mut state, &path);
            state.set_filter(&path, key, value);
        }

        state.set_limit(&root, self.limit);
        state.set_offset(&root, self.offset);
        Ok(state)
    }
}

/// Split `relation.chain:rest` into the node it addresses and `rest`.
fn target<'a>(root: &Path, arg: &'a str) -> (Path, &'a str) {
    match arg.split_once(':') {
        Some((relations, rest)) => {
            let path = relations
                .split('.')
                .filter(|relation| !relation.is_empty())
                .fold(root.clone(), |path, relation| path.child(relation));
            (path, rest)
        }
        None => (root.clone(), arg),
    }
}

/// Expand every relation between the root and `path` so the synthesizer
/// reaches it even when the intermediate nodes select nothing.
fn expand_chain(state: &mut SelectionState, path: &Path) {
    let mut current = Some(path.clone());
    while let Some(node) = current {
        if node.depth() == 0 {
            break;
        }
        state.set_expanded(&node, true);
        current = node.parent();
    }
}

fn parse_filter(arg: &str) -> Result<(&str, Value)> {
    let (key, raw) = arg
        .split_once('=')
        .with_context(|| format!("Filter '{arg}' is not KEY=VALUE"))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key, value))
}
