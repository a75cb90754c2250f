//! Tracing setup for the language server.
//!
//! Events go to a daily rolling file in the temp directory and, at INFO and
//! above, to the client as `window/logMessage` notifications.

use std::sync::Arc;

use tower_lsp_server::ls_types::MessageType;
use tracing::field::Visit;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

const LOG_FILE: &str = "sgls.log";

type SendMessage = Arc<dyn Fn(MessageType, String) + Send + Sync>;

/// Forwards tracing events to the client's output channel.
pub struct LspLayer {
    send_message: SendMessage,
}

impl LspLayer {
    pub fn new<F>(send_message: F) -> Self
    where
        F: Fn(MessageType, String) + Send + Sync + 'static,
    {
        Self {
            send_message: Arc::new(send_message),
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }
}

fn message_type(level: Level) -> Option<MessageType> {
    match level {
        Level::ERROR => Some(MessageType::ERROR),
        Level::WARN => Some(MessageType::WARNING),
        Level::INFO => Some(MessageType::INFO),
        Level::DEBUG => Some(MessageType::LOG),
        Level::TRACE => None,
    }
}

impl<S> Layer<S> for LspLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let Some(message_type) = message_type(*event.metadata().level()) else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if let Some(message) = visitor.message {
            (self.send_message)(message_type, message);
        }
    }
}

/// Install the global subscriber. Keep the returned guard alive for as long
/// as the server runs, or buffered file output is lost.
pub fn init_tracing<F>(send_message: F) -> WorkerGuard
where
    F: Fn(MessageType, String) + Send + Sync + 'static,
{
    let file_appender = tracing_appender::rolling::daily(std::env::temp_dir(), LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    let lsp_layer =
        LspLayer::new(send_message).with_filter(tracing_subscriber::filter::LevelFilter::INFO);

    // A second install (tests, embedding) keeps the first subscriber.
    let _ = Registry::default()
        .with(file_layer)
        .with(lsp_layer)
        .try_init();

    guard
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_forwards_info_and_skips_trace() {
        let received: Arc<Mutex<Vec<(MessageType, String)>>> = Arc::default();
        let sink = Arc::clone(&received);
        let layer = LspLayer::new(move |kind, message| {
            sink.lock().unwrap().push((kind, message));
        });
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("schema loaded");
            tracing::warn!(entities = 3, "schema has issues");
            tracing::trace!("noise");
        });

        let received = received.lock().unwrap();
        assert_eq!(
            *received,
            [
                (MessageType::INFO, "schema loaded".to_string()),
                (MessageType::WARNING, "schema has issues".to_string()),
            ]
        );
    }
}
