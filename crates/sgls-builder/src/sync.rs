use std::sync::Arc;

use serde_json::Value;
use sgls_document::Document;
use sgls_document::Mode;
use sgls_schema::Schema;

use crate::synthesize;
use crate::template;
use crate::BuilderError;
use crate::MemoryModeStore;
use crate::ModeStore;
use crate::Path;
use crate::SelectionState;
use crate::SynthesisOptions;

/// Everything the synchronizer reads but does not own the lifecycle of.
pub struct Session {
    pub schema: Option<Arc<Schema>>,
    pub store: Box<dyn ModeStore>,
    pub options: SynthesisOptions,
}

impl Session {
    #[must_use]
    pub fn new(schema: Option<Arc<Schema>>) -> Self {
        Self {
            schema,
            store: Box::new(MemoryModeStore::new()),
            options: SynthesisOptions::default(),
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: Box<dyn ModeStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: SynthesisOptions) -> Self {
        self.options = options;
        self
    }
}

/// Where the text shown after a mode switch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restored {
    /// The saved document for the mode, naming the same entity.
    Saved,
    /// A fresh template for the active entity.
    Template,
    /// Whatever was saved for the mode, possibly nothing.
    Fallback,
    /// Builder changes made outside query mode, synthesized on return.
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Builder state produced new text.
    Synthesized(String),
    /// An edit changed which entity the text is about.
    ActiveEntityChanged(Option<String>),
    ModeSwitched {
        mode: Mode,
        text: String,
        restored: Restored,
    },
}

/// Keeps the builder selection and the document text describing the same
/// request.
///
/// Builder changes rewrite the text; text edits only update the active
/// entity. The last applied fingerprint stops either path from echoing the
/// other.
pub struct Synchronizer {
    session: Session,
    mode: Mode,
    root: Option<String>,
    active_entity: Option<String>,
    state: SelectionState,
    text: String,
    applied: Option<String>,
    record_next: bool,
}

impl Synchronizer {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session,
            mode: Mode::Query,
            root: None,
            active_entity: None,
            state: SelectionState::new(),
            text: String::new(),
            applied: None,
            record_next: false,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn root_entity(&self) -> Option<&str> {
        self.root.as_deref()
    }

    #[must_use]
    pub fn active_entity(&self) -> Option<&str> {
        self.active_entity.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Install the schema once it has loaded.
    pub fn set_schema(&mut self, schema: Arc<Schema>) {
        self.session.schema = Some(schema);
    }

    /// Choose the entity the builder edits. A different entity wipes the
    /// selection; the following observation only records.
    pub fn set_root_entity(&mut self, entity: Option<&str>) -> Option<SyncEvent> {
        if self.root.as_deref() == entity {
            return None;
        }
        tracing::debug!(from = ?self.root, to = ?entity, "root entity changed");
        self.state.clear();
        self.root = entity.map(str::to_string);
        if entity.is_some() {
            self.active_entity.clone_from(&self.root);
        }
        self.record_next = true;
        self.observe()
    }

    /// Apply a builder change and resynthesize if it changed anything.
    pub fn update<F>(&mut self, change: F) -> Option<SyncEvent>
    where
        F: FnOnce(&mut SelectionState),
    {
        change(&mut self.state);
        self.observe()
    }

    pub fn toggle_field(&mut self, path: &Path, field: &str) -> Option<SyncEvent> {
        self.update(|state| {
            state.toggle_field(path, field);
        })
    }

    pub fn set_filter(&mut self, path: &Path, key: &str, value: Value) -> Option<SyncEvent> {
        self.update(|state| state.set_filter(path, key, value))
    }

    pub fn remove_filter(&mut self, path: &Path, key: &str) -> Option<SyncEvent> {
        self.update(|state| state.remove_filter(path, key))
    }

    pub fn set_limit(&mut self, path: &Path, limit: Option<u64>) -> Option<SyncEvent> {
        self.update(|state| state.set_limit(path, limit))
    }

    pub fn set_offset(&mut self, path: &Path, offset: Option<u64>) -> Option<SyncEvent> {
        self.update(|state| state.set_offset(path, offset))
    }

    pub fn toggle_expanded(&mut self, path: &Path) -> Option<SyncEvent> {
        self.update(|state| {
            state.toggle_expanded(path);
        })
    }

    /// Compare the selection with what was last applied and resynthesize
    /// when it moved, in query mode, with a root and a schema.
    pub fn observe(&mut self) -> Option<SyncEvent> {
        let fingerprint = self.state.fingerprint();

        if self.record_next {
            self.record_next = false;
            self.applied = Some(fingerprint);
            return None;
        }
        if self.applied.as_ref() == Some(&fingerprint) || self.mode != Mode::Query {
            return None;
        }

        let schema = self.session.schema.as_deref()?;
        let document = synthesize(
            self.root.as_deref(),
            &self.state,
            schema,
            &self.session.options,
        )?;
        let text = serde_json::to_string_pretty(&document).ok()?;

        tracing::trace!(root = ?self.root, "synthesized document");
        self.text.clone_from(&text);
        self.applied = Some(fingerprint);
        Some(SyncEvent::Synthesized(text))
    }

    /// Take text typed by the user. The selection is left alone.
    pub fn edit_text(&mut self, text: &str) -> Option<SyncEvent> {
        text.clone_into(&mut self.text);
        let active = sgls_document::active_entity(&self.text);
        if active == self.active_entity {
            return None;
        }
        self.active_entity.clone_from(&active);
        Some(SyncEvent::ActiveEntityChanged(active))
    }

    /// Save the current text under the current mode and load a document for
    /// `mode`.
    pub fn switch_mode(&mut self, mode: Mode) -> Option<SyncEvent> {
        if mode == self.mode {
            return None;
        }
        self.session.store.set(self.mode, &self.text);

        let saved = self.session.store.get(mode);
        let entity = self.active_entity.clone();

        let same_entity = saved.as_deref().is_some_and(|saved| {
            entity.is_some() && sgls_document::active_entity(saved) == entity
        });

        let template = entity.as_deref().and_then(|entity| {
            let schema = self.session.schema.as_deref()?;
            template::template_text(mode, entity, schema, &self.session.options)
        });

        let (text, restored) = match (saved, template) {
            (Some(saved), _) if same_entity => (saved, Restored::Saved),
            (_, Some(template)) => (template, Restored::Template),
            (saved, None) => (saved.unwrap_or_default(), Restored::Fallback),
        };

        tracing::debug!(from = %self.mode, to = %mode, ?restored, "mode switched");
        self.mode = mode;
        self.text.clone_from(&text);

        if restored == Restored::Saved {
            self.applied = Some(self.state.fingerprint());
        } else if let Some(SyncEvent::Synthesized(text)) = self.observe() {
            return Some(SyncEvent::ModeSwitched {
                mode,
                text,
                restored: Restored::Synthesized,
            });
        }

        Some(SyncEvent::ModeSwitched {
            mode,
            text,
            restored,
        })
    }

    /// Explicitly rebuild the selection from the current text.
    ///
    /// Never runs on its own; text edits do not reach the builder otherwise.
    pub fn import_text(&mut self) -> Result<(), BuilderError> {
        let schema = self.session.schema.as_deref().ok_or(BuilderError::NoSchema)?;
        let Document::Query(queries) = Document::parse(&self.text)? else {
            return Err(BuilderError::NotAQuery);
        };
        let query = queries.first().ok_or(BuilderError::NotAQuery)?;
        if !schema.contains_entity(&query.name) {
            return Err(BuilderError::UnknownEntity(query.name.clone()));
        }

        self.state = SelectionState::from_query(query);
        self.root = Some(query.name.clone());
        self.active_entity.clone_from(&self.root);
        self.record_next = false;
        self.applied = Some(self.state.fingerprint());
        Ok(())
    }
}
