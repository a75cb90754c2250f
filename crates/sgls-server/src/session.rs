use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use sgls_builder::FileModeStore;
use sgls_builder::LookupTicket;
use sgls_builder::LookupTracker;
use sgls_builder::MemoryModeStore;
use sgls_builder::ModeStore;
use sgls_builder::SynthesisOptions;
use sgls_builder::Synchronizer;
use sgls_conf::Settings;
use sgls_ide::collect_diagnostics;
use sgls_ide::complete;
use sgls_ide::detect_context;
use sgls_ide::to_completion_item;
use sgls_schema::schema_source;
use sgls_schema::Schema;
use sgls_schema::SchemaSource;
use sgls_source::PositionEncoding;
use tower_lsp_server::ls_types;

use crate::documents::Store;
use crate::ext::PositionExt;

/// Everything the server knows between requests.
#[derive(Default)]
pub struct Session {
    project_root: Option<Utf8PathBuf>,
    settings: Settings,
    schema: Option<Arc<Schema>>,
    documents: Store,
    encoding: PositionEncoding,
    schema_loads: LookupTracker,
    builder: Option<Synchronizer>,
}

impl Session {
    pub fn new(
        project_root: Option<Utf8PathBuf>,
        settings: Settings,
        encoding: PositionEncoding,
    ) -> Self {
        Self {
            project_root,
            settings,
            encoding,
            ..Self::default()
        }
    }

    pub fn project_root(&self) -> Option<&Utf8PathBuf> {
        self.project_root.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings. The builder is rebuilt on next use so it
    /// picks up the new store directory and limit.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
        self.builder = None;
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_deref()
    }

    pub fn set_schema(&mut self, schema: Schema) {
        let schema = Arc::new(schema);
        if let Some(builder) = &mut self.builder {
            builder.set_schema(Arc::clone(&schema));
        }
        self.schema = Some(schema);
    }

    /// The builder behind mode switches, created on first use.
    pub fn builder_mut(&mut self) -> &mut Synchronizer {
        let builder = match self.builder.take() {
            Some(builder) => builder,
            None => Synchronizer::new(
                sgls_builder::Session::new(self.schema.clone())
                    .with_store(self.mode_store())
                    .with_options(self.synthesis_options()),
            ),
        };
        self.builder.insert(builder)
    }

    /// Saved documents go under `store_dir`, relative to the project root,
    /// or the user data directory. Without either they live in memory.
    fn mode_store(&self) -> Box<dyn ModeStore> {
        let Some(dir) = self.settings.resolved_store_dir() else {
            tracing::debug!("no store directory; keeping documents in memory");
            return Box::new(MemoryModeStore::new());
        };
        match &self.project_root {
            Some(root) if dir.is_relative() => Box::new(FileModeStore::new(root.join(dir))),
            _ => Box::new(FileModeStore::new(dir)),
        }
    }

    /// Start loading the configured schema. Any load already in flight is
    /// superseded and its result will be refused.
    pub fn begin_schema_load(&mut self) -> Option<(LookupTicket, Box<dyn SchemaSource>)> {
        let source = self.schema_source()?;
        Some((self.schema_loads.begin(), source))
    }

    /// Install a loaded schema unless a newer load started meanwhile.
    pub fn finish_schema_load(&mut self, ticket: LookupTicket, schema: Schema) -> bool {
        match self.schema_loads.accept(ticket, schema) {
            Some(schema) => {
                self.set_schema(schema);
                true
            }
            None => false,
        }
    }

    pub fn documents(&self) -> &Store {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut Store {
        &mut self.documents
    }

    pub fn encoding(&self) -> PositionEncoding {
        self.encoding
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.settings.debounce_ms)
    }

    pub fn synthesis_options(&self) -> SynthesisOptions {
        SynthesisOptions {
            default_limit: Some(u64::from(self.settings.default_limit)),
        }
    }

    /// Where the configured schema comes from. Relative file paths are
    /// taken from the project root.
    pub fn schema_source(&self) -> Option<Box<dyn SchemaSource>> {
        let location = self.settings.schema.as_deref()?;
        let is_url = location.starts_with("http://") || location.starts_with("https://");

        match &self.project_root {
            Some(root) if !is_url && Utf8PathBuf::from(location).is_relative() => {
                Some(schema_source(root.join(location).as_str()))
            }
            _ => Some(schema_source(location)),
        }
    }

    /// Diagnostics and version for an open document, or `None` while there
    /// is no schema to check against.
    pub fn diagnostics(&self, uri: &str) -> Option<(Vec<ls_types::Diagnostic>, i32)> {
        let schema = self.schema.as_ref()?;
        let document = self.documents.get(uri)?;
        let diagnostics = collect_diagnostics(
            document.text(),
            schema,
            &self.settings.diagnostics,
            self.encoding,
        );
        Some((diagnostics, document.version()))
    }

    pub fn completions(
        &self,
        uri: &str,
        position: ls_types::Position,
    ) -> Option<Vec<ls_types::CompletionItem>> {
        let schema = self.schema.as_ref()?;
        let document = self.documents.get(uri)?;
        let text = document.text();
        let index = document.line_index();

        let offset = position.to_offset(text, index, self.encoding).as_usize();
        let context = detect_context(text, offset);
        tracing::debug!(kind = ?context.kind, offset, "completion context");

        let options = self.synthesis_options();
        let items = complete(&context, schema, document.mode(), &options)
            .iter()
            .map(|suggestion| to_completion_item(suggestion, text, index, self.encoding))
            .collect();
        Some(items)
    }
}
