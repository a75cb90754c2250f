use serde_json::Value;

use crate::Document;

/// Sends documents to the gateway. Transport is left to the embedder.
pub trait QueryExecutor {
    type Error;

    fn execute(&self, document: &Document) -> Result<Value, Self::Error>;
}

/// Pagination state read back from a query response:
/// `{"data": {"items": [...], "pagination": {"total", "limit", "offset", "has_next"}}}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub total: u64,
    pub limit: Option<u64>,
    pub offset: u64,
    pub returned: u64,
    pub has_next: bool,
}

impl PageInfo {
    #[must_use]
    pub fn from_response(response: &Value) -> Option<Self> {
        let data = response.get("data")?;
        let returned = data
            .get("items")
            .and_then(Value::as_array)
            .map_or(0, |items| items.len() as u64);
        let pagination = data.get("pagination")?;

        let total = pagination.get("total").and_then(Value::as_u64)?;
        let limit = pagination.get("limit").and_then(Value::as_u64);
        let offset = pagination
            .get("offset")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let has_next = pagination
            .get("has_next")
            .and_then(Value::as_bool)
            .unwrap_or(total > offset + returned);

        Some(PageInfo {
            total,
            limit,
            offset,
            returned,
            has_next,
        })
    }

    fn page_size(&self) -> u64 {
        self.limit.unwrap_or(self.returned).max(1)
    }

    #[must_use]
    pub fn next_offset(&self) -> Option<u64> {
        self.has_next.then(|| self.offset + self.page_size())
    }

    #[must_use]
    pub fn previous_offset(&self) -> Option<u64> {
        (self.offset > 0).then(|| self.offset.saturating_sub(self.page_size()))
    }
}
