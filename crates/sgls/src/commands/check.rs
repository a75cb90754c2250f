use std::io::IsTerminal;
use std::io::Read as _;

use anyhow::Context;
use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use sgls_conf::DiagnosticSeverity;
use sgls_conf::DiagnosticsConfig;
use sgls_conf::Settings;
use sgls_ide::diagnostics::apply_config;
use sgls_ide::diagnostics::render_finding;
use sgls_ide::validate;
use sgls_schema::Schema;
use sgls_source::DiagnosticRenderer;

use crate::args::Args;
use crate::commands::load_schema;
use crate::commands::load_settings;
use crate::commands::resolve_project_root;
use crate::commands::Command;
use crate::exit::Exit;
use crate::walk::walk_documents;

#[derive(Debug, Parser)]
pub struct Check {
    /// Files or directories to check. Reads stdin when omitted and input
    /// is piped.
    paths: Vec<Utf8PathBuf>,

    /// Schema file or URL. Defaults to `schema` from the settings.
    #[arg(long)]
    schema: Option<String>,

    /// Select specific diagnostic codes to enable (e.g. S103,S104).
    #[arg(long, value_delimiter = ',')]
    select: Vec<String>,

    /// Ignore specific diagnostic codes (e.g. S101,S105).
    #[arg(long, value_delimiter = ',')]
    ignore: Vec<String>,
}

impl Command for Check {
    fn execute(&self, _args: &Args) -> Result<Exit> {
        let project_root = resolve_project_root()?;
        let settings = load_settings(&project_root)?;
        let schema = load_schema(self.schema.as_deref(), &settings, &project_root)?;

        let config = build_diagnostics_config(&settings, &self.select, &self.ignore);
        let fmt = pick_renderer();

        if self.paths.is_empty() {
            if std::io::stdin().is_terminal() {
                return Ok(Exit::error().with_message("No paths given and nothing on stdin."));
            }
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("Failed to read stdin")?;
            let rendered = check_source("<stdin>", &source, &schema, &config, &fmt);
            return Ok(summarize(rendered.len(), usize::from(!rendered.is_empty())));
        }

        let files = walk_documents(&self.paths);
        tracing::info!("checking {} documents", files.len());

        let mut problem_count = 0;
        let mut file_count = 0;
        for path in &files {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {path}"))?;
            let display = path.strip_prefix(&project_root).unwrap_or(path);
            let rendered = check_source(display.as_str(), &source, &schema, &config, &fmt);
            if !rendered.is_empty() {
                file_count += 1;
                problem_count += rendered.len();
            }
        }

        Ok(summarize(problem_count, file_count))
    }
}

/// Validate one document and print every finding; returns what was printed.
fn check_source(
    path: &str,
    source: &str,
    schema: &Schema,
    config: &DiagnosticsConfig,
    fmt: &DiagnosticRenderer,
) -> Vec<String> {
    let findings = apply_config(validate(source, schema), config);
    let rendered: Vec<String> = findings
        .iter()
        .map(|finding| render_finding(source, path, finding, fmt))
        .collect();
    for output in &rendered {
        println!("{output}\n");
    }
    rendered
}

fn summarize(problem_count: usize, file_count: usize) -> Exit {
    if problem_count == 0 {
        return Exit::success();
    }
    let file_word = if file_count == 1 { "file" } else { "files" };
    let problem_word = if problem_count == 1 { "problem" } else { "problems" };
    Exit::error().with_message(format!(
        "Found {problem_count} {problem_word} in {file_count} {file_word}."
    ))
}

fn build_diagnostics_config(
    settings: &Settings,
    select: &[String],
    ignore: &[String],
) -> DiagnosticsConfig {
    let mut config = settings.diagnostics.clone();

    for code in select {
        config
            .severity
            .insert(code.clone(), DiagnosticSeverity::Error);
    }

    for code in ignore {
        config.severity.insert(code.clone(), DiagnosticSeverity::Off);
    }

    config
}

fn pick_renderer() -> DiagnosticRenderer {
    if std::io::stdout().is_terminal() {
        DiagnosticRenderer::styled()
    } else {
        DiagnosticRenderer::plain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_beats_select() {
        let config = build_diagnostics_config(
            &Settings::default(),
            &["S101".to_string()],
            &["S101".to_string(), "S104".to_string()],
        );
        assert!(!config.is_enabled("S101", DiagnosticSeverity::Warning));
        assert!(!config.is_enabled("S104", DiagnosticSeverity::Warning));
    }

    #[test]
    fn test_select_raises_to_error() {
        let config = build_diagnostics_config(&Settings::default(), &["S10".to_string()], &[]);
        assert_eq!(
            config.get_severity("S103", DiagnosticSeverity::Warning),
            DiagnosticSeverity::Error
        );
    }

    #[test]
    fn test_summary_wording() {
        let exit = format!("{:?}", summarize(3, 2));
        assert!(exit.contains("Found 3 problems in 2 files."));
        assert!(format!("{:?}", summarize(1, 1)).contains("Found 1 problem in 1 file."));
    }
}
