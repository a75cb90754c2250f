use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use sgls_document::EntityQuery;
use sgls_schema::Entity;

use crate::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// What the builder has chosen at every node of the tree.
///
/// Entries appear lazily as paths are touched and are only dropped by
/// [`clear`](Self::clear).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectionState {
    selected_fields: BTreeMap<Path, Vec<String>>,
    filters: BTreeMap<Path, IndexMap<String, Value>>,
    pagination: BTreeMap<Path, Pagination>,
    expanded: BTreeMap<Path, bool>,
}

impl SelectionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the field is selected afterwards.
    pub fn toggle_field(&mut self, path: &Path, field: &str) -> bool {
        let fields = self.selected_fields.entry(path.clone()).or_default();
        if let Some(position) = fields.iter().position(|f| f == field) {
            fields.remove(position);
            false
        } else {
            fields.push(field.to_string());
            true
        }
    }

    pub fn select_field(&mut self, path: &Path, field: &str) {
        let fields = self.selected_fields.entry(path.clone()).or_default();
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
    }

    pub fn deselect_field(&mut self, path: &Path, field: &str) {
        if let Some(fields) = self.selected_fields.get_mut(path) {
            fields.retain(|f| f != field);
        }
    }

    pub fn set_fields(&mut self, path: &Path, fields: Vec<String>) {
        self.selected_fields.insert(path.clone(), fields);
    }

    /// Select every field of `entity`, `id` first.
    pub fn select_all_fields(&mut self, path: &Path, entity: &Entity) {
        let fields = entity
            .sorted_field_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        self.set_fields(path, fields);
    }

    pub fn set_filter(&mut self, path: &Path, key: &str, value: Value) {
        self.filters
            .entry(path.clone())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn remove_filter(&mut self, path: &Path, key: &str) {
        if let Some(filters) = self.filters.get_mut(path) {
            filters.shift_remove(key);
        }
    }

    pub fn set_limit(&mut self, path: &Path, limit: Option<u64>) {
        self.pagination.entry(path.clone()).or_default().limit = limit;
    }

    pub fn set_offset(&mut self, path: &Path, offset: Option<u64>) {
        self.pagination.entry(path.clone()).or_default().offset = offset;
    }

    /// Returns whether the node is expanded afterwards.
    pub fn toggle_expanded(&mut self, path: &Path) -> bool {
        let expanded = self.expanded.entry(path.clone()).or_default();
        *expanded = !*expanded;
        *expanded
    }

    pub fn set_expanded(&mut self, path: &Path, expanded: bool) {
        self.expanded.insert(path.clone(), expanded);
    }

    pub fn clear(&mut self) {
        self.selected_fields.clear();
        self.filters.clear();
        self.pagination.clear();
        self.expanded.clear();
    }

    #[must_use]
    pub fn fields(&self, path: &Path) -> &[String] {
        self.selected_fields
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn filters(&self, path: &Path) -> Option<&IndexMap<String, Value>> {
        self.filters.get(path).filter(|filters| !filters.is_empty())
    }

    #[must_use]
    pub fn pagination(&self, path: &Path) -> Pagination {
        self.pagination.get(path).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn has_selection(&self, path: &Path) -> bool {
        !self.fields(path).is_empty()
    }

    #[must_use]
    pub fn is_expanded(&self, path: &Path) -> bool {
        self.expanded.get(path).copied().unwrap_or(false)
    }

    /// Stable serialization used to detect real changes.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Rebuild builder state from a parsed query.
    ///
    /// Every nested relation is marked expanded so that synthesis reproduces
    /// it even when it selects no fields.
    #[must_use]
    pub fn from_query(query: &EntityQuery) -> Self {
        let mut state = SelectionState::new();
        state.absorb(&Path::root(&query.name), query);
        state
    }

    fn absorb(&mut self, path: &Path, query: &EntityQuery) {
        if let Some(fields) = &query.fields {
            self.set_fields(path, fields.clone());
        }
        for (key, value) in &query.filters {
            self.set_filter(path, key, value.clone());
        }
        if query.limit.is_some() || query.offset.is_some() {
            self.pagination.insert(
                path.clone(),
                Pagination {
                    limit: query.limit,
                    offset: query.offset,
                },
            );
        }
        for (relation, child) in &query.relations {
            let child_path = path.child(relation);
            self.set_expanded(&child_path, true);
            self.absorb(&child_path, child);
        }
    }
}

#[cfg(test)]
mod tests {
    use sgls_schema::testing::sample_schema;

    use super::*;

    #[test]
    fn test_toggle_field_keeps_selection_order() {
        let root = Path::root("Person");
        let mut state = SelectionState::new();
        assert!(state.toggle_field(&root, "name"));
        assert!(state.toggle_field(&root, "id"));
        assert_eq!(state.fields(&root), ["name", "id"]);

        assert!(!state.toggle_field(&root, "name"));
        assert_eq!(state.fields(&root), ["id"]);
    }

    #[test]
    fn test_deselecting_keeps_the_entry() {
        let root = Path::root("Person");
        let mut state = SelectionState::new();
        state.select_field(&root, "id");
        state.deselect_field(&root, "id");
        assert!(!state.has_selection(&root));
        assert_ne!(state.fingerprint(), SelectionState::new().fingerprint());

        state.clear();
        assert_eq!(state, SelectionState::new());
    }

    #[test]
    fn test_select_all_puts_id_first() {
        let schema = sample_schema();
        let root = Path::root("Person");
        let mut state = SelectionState::new();
        state.select_all_fields(&root, schema.entity("Person").unwrap());
        assert_eq!(state.fields(&root)[0], "id");
        assert_eq!(state.fields(&root).len(), 5);
    }

    #[test]
    fn test_empty_filters_read_as_none() {
        let root = Path::root("Person");
        let mut state = SelectionState::new();
        state.set_filter(&root, "name__eq", Value::from("x"));
        state.remove_filter(&root, "name__eq");
        assert_eq!(state.filters(&root), None);
    }

    #[test]
    fn test_fingerprint_is_order_independent_across_paths() {
        let root = Path::root("Person");
        let child = root.child("owned_properties");

        let mut a = SelectionState::new();
        a.select_field(&root, "id");
        a.set_expanded(&child, true);

        let mut b = SelectionState::new();
        b.set_expanded(&child, true);
        b.select_field(&root, "id");

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_toggle_expanded() {
        let path = Path::root("Person").child("owned_properties");
        let mut state = SelectionState::new();
        assert!(state.toggle_expanded(&path));
        assert!(state.is_expanded(&path));
        assert!(!state.toggle_expanded(&path));
    }
}
