mod commands;
mod debounce;
mod documents;
mod ext;
mod logging;
mod server;
mod session;

use anyhow::Context;
use anyhow::Result;
use tower_lsp_server::LspService;
use tower_lsp_server::Server;

pub use crate::commands::SYNTHESIZE;
pub use crate::commands::SWITCH_MODE;
pub use crate::commands::TRANSACTION;
pub use crate::server::SchemaLanguageServer;

/// Serve LSP over stdio until the client disconnects.
///
/// Settings are read from the workspace the client opens, so nothing is
/// configured here.
pub fn run() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(async {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();

        let (service, socket) = LspService::build(|client| {
            let log_client = client.clone();
            let guard = logging::init_tracing(move |message_type, message| {
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    return;
                };
                let client = log_client.clone();
                handle.spawn(async move {
                    client.log_message(message_type, message).await;
                });
            });

            SchemaLanguageServer::new(client, guard)
        })
        .finish();

        Server::new(stdin, stdout, socket).serve(service).await;
    });

    Ok(())
}
