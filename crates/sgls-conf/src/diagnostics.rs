use std::collections::HashMap;

use serde::Deserialize;
use tower_lsp_server::ls_types;

/// Configured severity for a diagnostic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Off,
    Error,
    Warning,
    Info,
    Hint,
}

impl DiagnosticSeverity {
    /// Convert to LSP diagnostic severity.
    /// Returns None for Off (diagnostic should not be published).
    #[must_use]
    pub fn to_lsp_severity(self) -> Option<ls_types::DiagnosticSeverity> {
        match self {
            DiagnosticSeverity::Off => None,
            DiagnosticSeverity::Error => Some(ls_types::DiagnosticSeverity::ERROR),
            DiagnosticSeverity::Warning => Some(ls_types::DiagnosticSeverity::WARNING),
            DiagnosticSeverity::Info => Some(ls_types::DiagnosticSeverity::INFORMATION),
            DiagnosticSeverity::Hint => Some(ls_types::DiagnosticSeverity::HINT),
        }
    }
}

/// Per-code severity overrides for schema diagnostics.
///
/// Every diagnostic has a built-in severity (unknown entities are errors,
/// unknown fields are warnings, ...). Entries here replace it, either for a
/// single code or for every code sharing a prefix.
///
/// ```toml
/// [diagnostics.severity]
/// S101 = "error"   # unknown fields are hard errors in this project
/// "S10" = "hint"
/// S106 = "off"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct DiagnosticsConfig {
    #[serde(default)]
    pub severity: HashMap<String, DiagnosticSeverity>,
}

impl DiagnosticsConfig {
    /// Look up the configured override for `code`.
    ///
    /// Resolution order (most specific wins):
    /// 1. Exact match (e.g., "S100")
    /// 2. Longest prefix match (e.g., "S10" over "S")
    ///
    /// # Examples
    /// ```
    /// # use sgls_conf::diagnostics::{DiagnosticsConfig, DiagnosticSeverity};
    /// # use std::collections::HashMap;
    /// let mut severity = HashMap::new();
    /// severity.insert("S".to_string(), DiagnosticSeverity::Hint);
    /// severity.insert("S101".to_string(), DiagnosticSeverity::Off);
    ///
    /// let config = DiagnosticsConfig { severity };
    ///
    /// assert_eq!(config.override_for("S101"), Some(DiagnosticSeverity::Off));
    /// assert_eq!(config.override_for("S100"), Some(DiagnosticSeverity::Hint));
    /// assert_eq!(config.override_for("X1"), None);
    /// ```
    #[must_use]
    pub fn override_for(&self, code: &str) -> Option<DiagnosticSeverity> {
        if let Some(&severity) = self.severity.get(code) {
            return Some(severity);
        }

        self.severity
            .iter()
            .filter(|(pattern, _)| code.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, &severity)| severity)
    }

    /// Severity for `code`, falling back to the diagnostic's built-in level.
    #[must_use]
    pub fn get_severity(&self, code: &str, default: DiagnosticSeverity) -> DiagnosticSeverity {
        self.override_for(code).unwrap_or(default)
    }

    #[must_use]
    pub fn is_enabled(&self, code: &str, default: DiagnosticSeverity) -> bool {
        self.get_severity(code, default) != DiagnosticSeverity::Off
    }
}
