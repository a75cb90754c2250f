use std::sync::Arc;

use camino::Utf8PathBuf;
use sgls_conf::Settings;
use tokio::sync::RwLock;
use tower_lsp_server::jsonrpc::Error as LspError;
use tower_lsp_server::jsonrpc::Result as LspResult;
use tower_lsp_server::ls_types;
use tower_lsp_server::Client;
use tower_lsp_server::LanguageServer;
use tracing_appender::non_blocking::WorkerGuard;

use crate::commands;
use crate::debounce::Debouncer;
use crate::ext::negotiate_encoding;
use crate::ext::PositionEncodingExt;
use crate::ext::UriExt;
use crate::session::Session;

const SERVER_NAME: &str = "Supergraph Language Server";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct SchemaLanguageServer {
    client: Client,
    session: Arc<RwLock<Session>>,
    debouncer: Debouncer<String>,
    _log_guard: WorkerGuard,
}

impl SchemaLanguageServer {
    #[must_use]
    pub fn new(client: Client, log_guard: WorkerGuard) -> Self {
        Self {
            client,
            session: Arc::new(RwLock::new(Session::default())),
            debouncer: Debouncer::default(),
            _log_guard: log_guard,
        }
    }

    pub async fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        let session = self.session.read().await;
        f(&session)
    }

    pub async fn with_session_mut<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.session.write().await;
        f(&mut session)
    }

    async fn publish(&self, uri: ls_types::Uri) {
        publish(&self.client, &self.session, uri).await;
    }

    /// Recompute diagnostics once edits to `uri` have been quiet for the
    /// configured period.
    async fn schedule_diagnostics(&self, uri: ls_types::Uri) {
        let client = self.client.clone();
        let session = Arc::clone(&self.session);
        let debouncer = self.debouncer.clone();
        let delay = self.with_session(Session::debounce).await;

        tokio::spawn(async move {
            if debouncer.settle(uri.as_str().to_string(), delay).await {
                publish(&client, &session, uri).await;
            }
        });
    }

    /// Fetch the configured schema in the background, then check every
    /// open document against it.
    fn spawn_schema_load(&self) {
        let client = self.client.clone();
        let session = Arc::clone(&self.session);
        tokio::spawn(load_schema(client, session));
    }
}

async fn load_schema(client: Client, session: Arc<RwLock<Session>>) {
    let Some((ticket, source)) = session.write().await.begin_schema_load() else {
        tracing::warn!("No schema configured; set `schema` in sgls.toml or SGLS_SCHEMA");
        return;
    };

    let location = source.describe();
    tracing::info!("Loading schema from {location}");

    let schema = match tokio::task::spawn_blocking(move || source.load()).await {
        Ok(Ok(schema)) => schema,
        Ok(Err(err)) => {
            tracing::error!("Failed to load schema from {location}: {err}");
            return;
        }
        Err(err) => {
            tracing::error!("Schema loading task failed: {err}");
            return;
        }
    };

    for issue in schema.integrity_issues() {
        tracing::warn!("Schema issue: {issue}");
    }
    let count = schema.entity_names().count();

    let open: Vec<String> = {
        let mut session = session.write().await;
        if !session.finish_schema_load(ticket, schema) {
            tracing::debug!("Discarding schema from {location}; a newer load is in flight");
            return;
        }
        session.documents().uris().map(str::to_string).collect()
    };
    tracing::info!("Loaded {count} entities from {location}");

    for uri in open {
        if let Ok(uri) = uri.parse::<ls_types::Uri>() {
            publish(&client, &session, uri).await;
        }
    }
}

async fn publish(client: &Client, session: &RwLock<Session>, uri: ls_types::Uri) {
    let Some((diagnostics, version)) = session.read().await.diagnostics(uri.as_str()) else {
        return;
    };
    tracing::debug!(uri = uri.as_str(), count = diagnostics.len(), "publishing diagnostics");
    client
        .publish_diagnostics(uri, diagnostics, Some(version))
        .await;
}

fn project_root(params: &ls_types::InitializeParams) -> Option<Utf8PathBuf> {
    let from_client = params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .and_then(|folder| folder.uri.to_utf8_path_buf());
    if from_client.is_some() {
        return from_client;
    }

    std::env::current_dir()
        .ok()
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
}

fn load_settings(root: Option<&Utf8PathBuf>) -> Settings {
    let Some(root) = root else {
        return Settings::default();
    };
    Settings::new(root.as_std_path()).unwrap_or_else(|err| {
        tracing::error!("Failed to load settings from {root}: {err}");
        Settings::default()
    })
}

impl LanguageServer for SchemaLanguageServer {
    async fn initialize(
        &self,
        params: ls_types::InitializeParams,
    ) -> LspResult<ls_types::InitializeResult> {
        tracing::info!("Initializing server...");

        let root = project_root(&params);
        let settings = load_settings(root.as_ref());
        let encoding = negotiate_encoding(&params.capabilities);
        tracing::info!(?root, ?encoding, "project resolved");

        self.with_session_mut(|session| {
            *session = Session::new(root, settings, encoding);
        })
        .await;

        Ok(ls_types::InitializeResult {
            capabilities: ls_types::ServerCapabilities {
                position_encoding: Some(encoding.to_lsp()),
                completion_provider: Some(ls_types::CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(
                        ["\"", "[", "{", ","].map(str::to_string).to_vec(),
                    ),
                    ..Default::default()
                }),
                execute_command_provider: Some(ls_types::ExecuteCommandOptions {
                    commands: commands::COMMANDS.map(str::to_string).to_vec(),
                    ..Default::default()
                }),
                text_document_sync: Some(ls_types::TextDocumentSyncCapability::Options(
                    ls_types::TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(ls_types::TextDocumentSyncKind::INCREMENTAL),
                        will_save: Some(false),
                        will_save_wait_until: Some(false),
                        save: None,
                    },
                )),
                ..Default::default()
            },
            server_info: Some(ls_types::ServerInfo {
                name: SERVER_NAME.to_string(),
                version: Some(SERVER_VERSION.to_string()),
            }),
            ..Default::default()
        })
    }

    async fn initialized(&self, _params: ls_types::InitializedParams) {
        tracing::info!("Server received initialized notification.");
        self.spawn_schema_load();
    }

    async fn shutdown(&self) -> LspResult<()> {
        Ok(())
    }

    async fn did_open(&self, params: ls_types::DidOpenTextDocumentParams) {
        tracing::debug!("Opened document: {}", params.text_document.uri.as_str());
        let uri = params.text_document.uri.clone();

        self.with_session_mut(|session| session.documents_mut().handle_did_open(&params))
            .await;
        self.publish(uri).await;
    }

    async fn did_change(&self, params: ls_types::DidChangeTextDocumentParams) {
        let uri = params.text_document.uri.clone();

        let applied = self
            .with_session_mut(|session| {
                let encoding = session.encoding();
                session.documents_mut().handle_did_change(&params, encoding)
            })
            .await;

        match applied {
            Ok(()) => self.schedule_diagnostics(uri).await,
            Err(err) => tracing::warn!("Ignoring change: {err}"),
        }
    }

    async fn did_close(&self, params: ls_types::DidCloseTextDocumentParams) {
        tracing::debug!("Closed document: {}", params.text_document.uri.as_str());
        let uri = params.text_document.uri.clone();

        self.with_session_mut(|session| session.documents_mut().handle_did_close(&params))
            .await;
        self.debouncer.forget(&uri.as_str().to_string()).await;
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn completion(
        &self,
        params: ls_types::CompletionParams,
    ) -> LspResult<Option<ls_types::CompletionResponse>> {
        let position = params.text_document_position;
        Ok(self
            .with_session(|session| {
                session.completions(position.text_document.uri.as_str(), position.position)
            })
            .await
            .map(ls_types::CompletionResponse::Array))
    }

    async fn execute_command(
        &self,
        params: ls_types::ExecuteCommandParams,
    ) -> LspResult<Option<ls_types::LSPAny>> {
        tracing::debug!(command = %params.command, "executing command");

        let result = self
            .with_session_mut(|session| {
                commands::execute(&params.command, params.arguments, session)
            })
            .await;

        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!("Command {} failed: {err}", params.command);
                Err(LspError::invalid_params(err.to_string()))
            }
        }
    }

    async fn did_change_configuration(&self, _params: ls_types::DidChangeConfigurationParams) {
        tracing::info!("Configuration change detected. Reloading settings...");

        let (root, old_schema) = self
            .with_session(|session| {
                (
                    session.project_root().cloned(),
                    session.settings().schema.clone(),
                )
            })
            .await;

        let settings = load_settings(root.as_ref());
        let schema_changed = settings.schema != old_schema;
        self.with_session_mut(|session| session.set_settings(settings))
            .await;

        if schema_changed {
            self.spawn_schema_load();
        }
    }
}
