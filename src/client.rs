// Query builder over the backend; every operation runs through the interceptor pipeline

use std::sync::Arc;

use serde_json::Value;

use crate::backend::DataBackend;
use crate::pipeline::{InterceptorPipeline, PipelineError};
use crate::query::{Filter, Operation, OrderBy, RequestContext, ResponseEnvelope};

/// Data access decorated with the interceptor pipeline.
///
/// Cloning is cheap; clones share the backend and the pipeline.
#[derive(Clone)]
pub struct DataClient {
    backend: Arc<dyn DataBackend>,
    pipeline: Arc<InterceptorPipeline>,
}

impl DataClient {
    pub fn new(backend: Arc<dyn DataBackend>, pipeline: Arc<InterceptorPipeline>) -> Self {
        Self { backend, pipeline }
    }

    pub fn pipeline(&self) -> &Arc<InterceptorPipeline> {
        &self.pipeline
    }

    /// Start a query against `collection`
    pub fn from(&self, collection: impl Into<String>) -> Table<'_> {
        Table {
            client: self,
            collection: collection.into(),
        }
    }

    /// Send a prepared request context through the pipeline
    pub async fn execute(&self, ctx: RequestContext) -> Result<ResponseEnvelope, PipelineError> {
        self.pipeline.execute(self.backend.as_ref(), ctx).await
    }
}

/// A collection, waiting for the operation to run on it
pub struct Table<'a> {
    client: &'a DataClient,
    collection: String,
}

impl<'a> Table<'a> {
    fn builder(self, operation: Operation) -> QueryBuilder<'a> {
        QueryBuilder {
            client: self.client,
            ctx: RequestContext::new(operation, self.collection),
        }
    }

    pub fn select(self, columns: &str) -> QueryBuilder<'a> {
        let mut builder = self.builder(Operation::Select);
        builder.ctx.query.columns = Some(columns.to_string());
        builder
    }

    pub fn insert(self, rows: Value) -> QueryBuilder<'a> {
        let mut builder = self.builder(Operation::Insert);
        builder.ctx.query.payload = Some(rows);
        builder
    }

    pub fn update(self, changes: Value) -> QueryBuilder<'a> {
        let mut builder = self.builder(Operation::Update);
        builder.ctx.query.payload = Some(changes);
        builder
    }

    pub fn delete(self) -> QueryBuilder<'a> {
        self.builder(Operation::Delete)
    }
}

#[must_use = "queries do nothing until executed"]
pub struct QueryBuilder<'a> {
    client: &'a DataClient,
    ctx: RequestContext,
}

impl<'a> QueryBuilder<'a> {
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.ctx.query.filters.push(Filter {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.ctx.query.order.push(OrderBy {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.ctx.query.limit = Some(limit);
        self
    }

    /// Expect exactly one row
    pub fn single(mut self) -> Self {
        self.ctx.query.single = true;
        self
    }

    /// Return the affected rows of a mutation
    pub fn returning(mut self, columns: &str) -> Self {
        self.ctx.query.columns = Some(columns.to_string());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.ctx.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    pub async fn execute(self) -> Result<ResponseEnvelope, PipelineError> {
        self.client.execute(self.ctx).await
    }
}
