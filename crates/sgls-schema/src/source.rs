use std::time::Duration;

use camino::Utf8PathBuf;

use crate::Schema;
use crate::SchemaError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Somewhere a schema can be loaded from. Loading blocks; async callers run
/// it on a blocking thread.
pub trait SchemaSource: Send + Sync {
    fn load(&self) -> Result<Schema, SchemaError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct FileSchemaSource {
    path: Utf8PathBuf,
}

impl FileSchemaSource {
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SchemaSource for FileSchemaSource {
    fn load(&self) -> Result<Schema, SchemaError> {
        let text = std::fs::read_to_string(self.path.as_std_path()).map_err(|source| {
            SchemaError::Io {
                path: self.path.clone(),
                source,
            }
        })?;
        Schema::from_json(&text)
    }

    fn describe(&self) -> String {
        self.path.to_string()
    }
}

/// Fetches the graph from the gateway's schema endpoint.
#[derive(Debug, Clone)]
pub struct HttpSchemaSource {
    url: String,
}

impl HttpSchemaSource {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl SchemaSource for HttpSchemaSource {
    fn load(&self) -> Result<Schema, SchemaError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent("sgls")
            .build()?;

        let resp = client.get(&self.url).send()?;
        if !resp.status().is_success() {
            return Err(SchemaError::Status {
                url: self.url.clone(),
                status: resp.status().as_u16(),
            });
        }

        let value: serde_json::Value = resp.json()?;
        Schema::from_value(value)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Pick a source for a configured location: http(s) URLs are fetched,
/// anything else is read from disk.
#[must_use]
pub fn schema_source(location: &str) -> Box<dyn SchemaSource> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Box::new(HttpSchemaSource::new(location))
    } else {
        Box::new(FileSchemaSource::new(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_source_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, crate::testing::SAMPLE_GRAPH).unwrap();

        let source = schema_source(path.to_str().unwrap());
        let schema = source.load().unwrap();
        assert!(schema.contains_entity("Person"));
        assert!(source.describe().ends_with("graph.json"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("missing.json")).unwrap();

        let err = FileSchemaSource::new(path).load().unwrap_err();
        assert!(matches!(err, SchemaError::Io { .. }));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_urls_pick_http_source() {
        assert_eq!(
            schema_source("https://gateway.local/graph").describe(),
            "https://gateway.local/graph"
        );
    }
}
