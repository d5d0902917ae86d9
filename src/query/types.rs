use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::PipelineError;

/// Data operations that pass through the interceptor pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Select,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Whether the operation writes rows
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Select)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filter on a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// Arguments of a data operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Column list to return; for mutations `None` means no rows are returned
    pub columns: Option<String>,
    /// Row payload for insert and update
    pub payload: Option<Value>,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    /// Expect exactly one row and return it as an object
    pub single: bool,
}

impl Query {
    /// Selected column names, or `None` for every column
    pub fn column_names(&self) -> Option<Vec<&str>> {
        match self.columns.as_deref().map(str::trim) {
            None | Some("") | Some("*") => None,
            Some(list) => Some(list.split(',').map(str::trim).filter(|c| !c.is_empty()).collect()),
        }
    }
}

/// Request context that flows through the request interceptor chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub operation: Operation,
    pub collection: String,
    pub query: Query,
    pub headers: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(operation: Operation, collection: impl Into<String>) -> Self {
        Self {
            operation,
            collection: collection.into(),
            query: Query::default(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Raw result of a backend data operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub data: Value,
    pub count: Option<usize>,
    pub status: u16,
}

impl QueryResult {
    pub fn new(data: Value, status: u16) -> Self {
        let count = data.as_array().map(Vec::len);
        Self { data, count, status }
    }
}

/// Backend result plus the request context that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub data: Value,
    pub count: Option<usize>,
    pub status: u16,
    pub request: RequestContext,
}

impl ResponseEnvelope {
    pub fn new(result: QueryResult, request: RequestContext) -> Self {
        Self {
            data: result.data,
            count: result.count,
            status: result.status,
            request,
        }
    }

    /// Decode a single-row response
    pub fn single<T: DeserializeOwned>(self) -> Result<T, PipelineError> {
        serde_json::from_value(self.data).map_err(|e| PipelineError::Decode(e.to_string()))
    }

    /// Decode a multi-row response; `null` is treated as no rows
    pub fn rows<T: DeserializeOwned>(self) -> Result<Vec<T>, PipelineError> {
        match self.data {
            Value::Null => Ok(Vec::new()),
            Value::Array(_) => {
                serde_json::from_value(self.data).map_err(|e| PipelineError::Decode(e.to_string()))
            }
            other => serde_json::from_value(other)
                .map(|row| vec![row])
                .map_err(|e| PipelineError::Decode(e.to_string())),
        }
    }
}
