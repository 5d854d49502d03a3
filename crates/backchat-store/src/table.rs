//! Plug-in document-table abstraction.
//!
//! The stores never talk to a concrete storage SDK; they go through
//! [`TableClient`], a thin asynchronous seam modeled on a managed
//! partition/sort-key document service: point get/put/delete, expression-style
//! updates, conditional writes, paginated queries (optionally against a
//! secondary index), full scans, and a batched write with a fixed per-call
//! item limit. Conditional failures surface as [`Error::Conflict`]; that is
//! the sole concurrency-control mechanism in the whole core.

use async_trait::async_trait;
use backchat_common::Result;
use serde_json::Value;

/// One document-table item: a flat attribute map.
pub type Item = serde_json::Map<String, Value>;

/// Predicate a conditional write must satisfy against the current item.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Every named attribute must be absent (the item must not exist under
    /// this key, or must lack all of these attributes).
    AttributeNotExists(Vec<String>),
    /// The named attribute must be present on an existing item.
    AttributeExists(String),
}

/// A single action inside an update expression.
#[derive(Debug, Clone)]
pub enum UpdateAction {
    /// `SET attr = value`
    Set(String, Value),
    /// `ADD attr delta` — numeric, creating the attribute at `delta` if absent
    Add(String, i64),
}

/// An update expression plus optional guard condition.
#[derive(Debug, Clone, Default)]
pub struct Update {
    pub actions: Vec<UpdateAction>,
    pub condition: Option<Condition>,
}

impl Update {
    pub fn set(mut self, attr: impl Into<String>, value: Value) -> Self {
        self.actions.push(UpdateAction::Set(attr.into(), value));
        self
    }

    pub fn add(mut self, attr: impl Into<String>, delta: i64) -> Self {
        self.actions.push(UpdateAction::Add(attr.into(), delta));
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// A paginated query over one partition (or one secondary-index key).
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Secondary index to query instead of the base table, if any.
    pub index: Option<String>,
    /// Equality condition on the partition (or index) key attribute.
    pub key: (String, Value),
    /// Sort-key order; `false` walks newest-first.
    pub ascending: bool,
    /// Maximum number of items for this page.
    pub limit: Option<usize>,
    /// Resume token from a previous page's `last_evaluated_key`.
    pub exclusive_start_key: Option<Item>,
    /// Attributes to project; `None` returns whole items.
    pub projection: Option<Vec<String>>,
}

impl QueryRequest {
    pub fn partition(attr: impl Into<String>, value: Value) -> Self {
        Self {
            index: None,
            key: (attr.into(), value),
            ascending: true,
            limit: None,
            exclusive_start_key: None,
            projection: None,
        }
    }

    pub fn on_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, key: Option<Item>) -> Self {
        self.exclusive_start_key = key;
        self
    }

    pub fn project(mut self, attrs: &[&str]) -> Self {
        self.projection = Some(attrs.iter().map(|a| (*a).to_owned()).collect());
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub items: Vec<Item>,
    /// Present when further pages remain; feed back via `start_after`.
    pub last_evaluated_key: Option<Item>,
}

/// A single request inside a batched write.
#[derive(Debug, Clone)]
pub enum WriteRequest {
    Put(Item),
    /// Delete by full key (partition + sort attributes).
    Delete(Item),
}

/// Asynchronous client for the external document-table service.
///
/// Implementations are expected to be cheap to share (`Arc<dyn TableClient>`)
/// and safe to call concurrently from many connection handlers without
/// coordination.
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Point lookup by full key. Absent items are `Ok(None)`.
    async fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>>;

    /// Insert or replace an item, optionally guarded by a condition.
    /// A failed condition is `Error::Conflict`.
    async fn put_item(&self, table: &str, item: Item, condition: Option<Condition>) -> Result<()>;

    /// Apply an update expression and return the post-update item.
    /// An unguarded update on a missing key upserts the item from its key
    /// attributes; a failed guard condition is `Error::Conflict`.
    async fn update_item(&self, table: &str, key: &Item, update: Update) -> Result<Item>;

    /// Delete by full key. Deleting a missing item succeeds.
    async fn delete_item(&self, table: &str, key: &Item) -> Result<()>;

    /// Query one partition (or secondary-index key), honoring order, limit,
    /// projection and pagination.
    async fn query(&self, table: &str, request: QueryRequest) -> Result<QueryResponse>;

    /// Full-table scan with optional projection. Expensive; callers accept
    /// weak freshness.
    async fn scan(&self, table: &str, projection: Option<Vec<String>>) -> Result<Vec<Item>>;

    /// Batched put/delete. Implementations reject calls above the service's
    /// per-call item limit with `Error::Validation`; use the chunked writer
    /// for unbounded request lists.
    async fn batch_write(&self, table: &str, requests: Vec<WriteRequest>) -> Result<()>;
}
