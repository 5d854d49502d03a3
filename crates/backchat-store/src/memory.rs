//! In-memory table backend.
//!
//! Stands in for the managed document-table service in tests and local
//! development: per-table partition/sort schemas, secondary indexes keyed by a
//! single attribute, conditional writes, query pagination with a configurable
//! page size, and an explicit [`MemoryTableClient::sweep_expired`] reaper
//! mirroring the service's advisory TTL semantics (expiry is eventual, never
//! instantaneous).
//!
//! The lock in here belongs to the simulated service, not to the core: the
//! stores themselves stay lock-free.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use backchat_common::{Error, Result};
use serde_json::Value;
use tracing::debug;

use crate::batch::MAX_BATCH_ITEMS;
use crate::table::{
    Condition, Item, QueryRequest, QueryResponse, TableClient, Update, UpdateAction, WriteRequest,
};

/// Sort-key value with a total order. Tables in this core sort either by a
/// numeric attribute (`sentAt`) or a string one (`userId`), never mixed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortVal {
    Unit,
    Int(i64),
    Str(String),
}

impl SortVal {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(SortVal::Int)
                .ok_or_else(|| Error::Validation(format!("non-integer sort key: {n}"))),
            Value::String(s) => Ok(SortVal::Str(s.clone())),
            other => Err(Error::Validation(format!("unsupported sort key: {other}"))),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            SortVal::Unit => Value::Null,
            SortVal::Int(n) => Value::from(*n),
            SortVal::Str(s) => Value::from(s.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct TableSchema {
    partition_key: String,
    sort_key: Option<String>,
    /// index name -> indexed attribute
    indexes: HashMap<String, String>,
}

#[derive(Debug)]
struct TableData {
    schema: TableSchema,
    items: BTreeMap<(String, SortVal), Item>,
}

/// In-memory [`TableClient`] implementation.
#[derive(Debug)]
pub struct MemoryTableClient {
    tables: RwLock<HashMap<String, TableData>>,
    page_size: Option<usize>,
}

impl Default for MemoryTableClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTableClient {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            page_size: None,
        }
    }

    /// Cap every query page at `page_size` items, forcing callers through the
    /// `last_evaluated_key` pagination path the real service exhibits.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Declare a table's key schema. Must be called before the table is used.
    pub fn create_table(&self, name: &str, partition_key: &str, sort_key: Option<&str>) {
        let mut tables = self.tables.write().expect("table lock poisoned");
        tables.insert(
            name.to_owned(),
            TableData {
                schema: TableSchema {
                    partition_key: partition_key.to_owned(),
                    sort_key: sort_key.map(str::to_owned),
                    indexes: HashMap::new(),
                },
                items: BTreeMap::new(),
            },
        );
    }

    /// Declare a secondary index over a single attribute of an existing table.
    pub fn create_index(&self, table: &str, index_name: &str, attr: &str) {
        let mut tables = self.tables.write().expect("table lock poisoned");
        if let Some(data) = tables.get_mut(table) {
            data.schema
                .indexes
                .insert(index_name.to_owned(), attr.to_owned());
        }
    }

    /// Delete every item whose `expiresAt` attribute (epoch seconds) is at or
    /// before `now_secs`, returning how many were reaped. This emulates the
    /// service's background TTL sweep.
    pub fn sweep_expired(&self, table: &str, now_secs: i64) -> usize {
        let mut tables = self.tables.write().expect("table lock poisoned");
        let Some(data) = tables.get_mut(table) else {
            return 0;
        };
        let before = data.items.len();
        data.items.retain(|_, item| {
            item.get("expiresAt")
                .and_then(Value::as_i64)
                .map(|expires| expires > now_secs)
                .unwrap_or(true)
        });
        before - data.items.len()
    }

    /// Number of live items in a table. Test observability only.
    pub fn item_count(&self, table: &str) -> usize {
        let tables = self.tables.read().expect("table lock poisoned");
        tables.get(table).map(|d| d.items.len()).unwrap_or(0)
    }

    fn extract_key(schema: &TableSchema, item: &Item) -> Result<(String, SortVal)> {
        let partition = item
            .get(&schema.partition_key)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Validation(format!("missing partition key {}", schema.partition_key))
            })?
            .to_owned();
        let sort = match &schema.sort_key {
            Some(attr) => {
                let value = item
                    .get(attr)
                    .ok_or_else(|| Error::Validation(format!("missing sort key {attr}")))?;
                SortVal::from_value(value)?
            }
            None => SortVal::Unit,
        };
        Ok((partition, sort))
    }

    fn check_condition(condition: &Condition, current: Option<&Item>) -> Result<()> {
        let ok = match condition {
            Condition::AttributeNotExists(attrs) => match current {
                None => true,
                Some(item) => attrs.iter().all(|a| !item.contains_key(a)),
            },
            Condition::AttributeExists(attr) => {
                current.map(|item| item.contains_key(attr)).unwrap_or(false)
            }
        };
        if ok {
            Ok(())
        } else {
            Err(Error::Conflict(format!("{condition:?}")))
        }
    }

    fn project(item: &Item, projection: Option<&Vec<String>>) -> Item {
        match projection {
            None => item.clone(),
            Some(attrs) => attrs
                .iter()
                .filter_map(|a| item.get(a).map(|v| (a.clone(), v.clone())))
                .collect(),
        }
    }

    fn key_item(schema: &TableSchema, key: &(String, SortVal)) -> Item {
        let mut item = Item::new();
        item.insert(schema.partition_key.clone(), Value::from(key.0.clone()));
        if let Some(attr) = &schema.sort_key {
            item.insert(attr.clone(), key.1.to_value());
        }
        item
    }

    fn with_table<R>(&self, table: &str, f: impl FnOnce(&TableData) -> Result<R>) -> Result<R> {
        let tables = self.tables.read().expect("table lock poisoned");
        let data = tables
            .get(table)
            .ok_or_else(|| Error::Table(format!("no such table: {table}")))?;
        f(data)
    }

    fn with_table_mut<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut TableData) -> Result<R>,
    ) -> Result<R> {
        let mut tables = self.tables.write().expect("table lock poisoned");
        let data = tables
            .get_mut(table)
            .ok_or_else(|| Error::Table(format!("no such table: {table}")))?;
        f(data)
    }
}

#[async_trait]
impl TableClient for MemoryTableClient {
    async fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>> {
        self.with_table(table, |data| {
            let key = Self::extract_key(&data.schema, key)?;
            Ok(data.items.get(&key).cloned())
        })
    }

    async fn put_item(&self, table: &str, item: Item, condition: Option<Condition>) -> Result<()> {
        self.with_table_mut(table, |data| {
            let key = Self::extract_key(&data.schema, &item)?;
            if let Some(condition) = &condition {
                Self::check_condition(condition, data.items.get(&key))?;
            }
            data.items.insert(key, item);
            Ok(())
        })
    }

    async fn update_item(&self, table: &str, key: &Item, update: Update) -> Result<Item> {
        self.with_table_mut(table, |data| {
            let key = Self::extract_key(&data.schema, key)?;
            let current = data.items.get(&key);
            if let Some(condition) = &update.condition {
                Self::check_condition(condition, current)?;
            }
            // Like the real service, an unguarded update on a missing key
            // creates the item from its key attributes.
            let mut item = match current {
                Some(item) => item.clone(),
                None => Self::key_item(&data.schema, &key),
            };
            for action in &update.actions {
                match action {
                    UpdateAction::Set(attr, value) => {
                        item.insert(attr.clone(), value.clone());
                    }
                    UpdateAction::Add(attr, delta) => {
                        let base = match item.get(attr) {
                            None => 0,
                            Some(v) => v.as_i64().ok_or_else(|| {
                                Error::Validation(format!("ADD on non-numeric attribute {attr}"))
                            })?,
                        };
                        item.insert(attr.clone(), Value::from(base + delta));
                    }
                }
            }
            data.items.insert(key, item.clone());
            Ok(item)
        })
    }

    async fn delete_item(&self, table: &str, key: &Item) -> Result<()> {
        self.with_table_mut(table, |data| {
            let key = Self::extract_key(&data.schema, key)?;
            data.items.remove(&key);
            Ok(())
        })
    }

    async fn query(&self, table: &str, request: QueryRequest) -> Result<QueryResponse> {
        self.with_table(table, |data| {
            let (key_attr, key_value) = &request.key;
            let mut matches: Vec<(&(String, SortVal), &Item)> = match &request.index {
                None => {
                    if *key_attr != data.schema.partition_key {
                        return Err(Error::Validation(format!(
                            "query key {key_attr} is not the partition key"
                        )));
                    }
                    data.items
                        .iter()
                        .filter(|((partition, _), _)| Value::from(partition.clone()) == *key_value)
                        .collect()
                }
                Some(index) => {
                    let attr = data.schema.indexes.get(index).ok_or_else(|| {
                        Error::Validation(format!("no such index: {index} on {table}"))
                    })?;
                    if key_attr != attr {
                        return Err(Error::Validation(format!(
                            "query key {key_attr} does not match index attribute {attr}"
                        )));
                    }
                    data.items
                        .iter()
                        .filter(|(_, item)| item.get(attr) == Some(key_value))
                        .collect()
                }
            };
            if !request.ascending {
                matches.reverse();
            }
            if let Some(start) = &request.exclusive_start_key {
                let start = Self::extract_key(&data.schema, start)?;
                if let Some(pos) = matches.iter().position(|(key, _)| **key == start) {
                    matches.drain(..=pos);
                }
            }
            let mut page = matches.len();
            if let Some(limit) = request.limit {
                page = page.min(limit);
            }
            if let Some(page_size) = self.page_size {
                page = page.min(page_size);
            }
            let truncated = page < matches.len();
            let taken = &matches[..page];
            let last_evaluated_key = if truncated {
                taken.last().map(|&(key, _)| Self::key_item(&data.schema, key))
            } else {
                None
            };
            debug!(
                "🔧 query {}: {} of {} items, more={}",
                table,
                taken.len(),
                matches.len(),
                truncated
            );
            Ok(QueryResponse {
                items: taken
                    .iter()
                    .map(|&(_, item)| Self::project(item, request.projection.as_ref()))
                    .collect(),
                last_evaluated_key,
            })
        })
    }

    async fn scan(&self, table: &str, projection: Option<Vec<String>>) -> Result<Vec<Item>> {
        self.with_table(table, |data| {
            Ok(data
                .items
                .values()
                .map(|item| Self::project(item, projection.as_ref()))
                .collect())
        })
    }

    async fn batch_write(&self, table: &str, requests: Vec<WriteRequest>) -> Result<()> {
        if requests.len() > MAX_BATCH_ITEMS {
            return Err(Error::Validation(format!(
                "batch of {} exceeds the {MAX_BATCH_ITEMS}-item limit",
                requests.len()
            )));
        }
        self.with_table_mut(table, |data| {
            for request in requests {
                match request {
                    WriteRequest::Put(item) => {
                        let key = Self::extract_key(&data.schema, &item)?;
                        data.items.insert(key, item);
                    }
                    WriteRequest::Delete(key) => {
                        let key = Self::extract_key(&data.schema, &key)?;
                        data.items.remove(&key);
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().cloned().expect("object literal")
    }

    fn client() -> MemoryTableClient {
        let client = MemoryTableClient::new();
        client.create_table("messages", "roomId", Some("sentAt"));
        client.create_index("messages", "messageId-index", "messageId");
        client
    }

    #[tokio::test]
    async fn conditional_put_conflicts_on_existing_key() {
        let client = client();
        let guard = Condition::AttributeNotExists(vec!["roomId".into(), "sentAt".into()]);
        let first = item(json!({"roomId": "r1", "sentAt": 5, "text": "a"}));
        let second = item(json!({"roomId": "r1", "sentAt": 5, "text": "b"}));
        client
            .put_item("messages", first, Some(guard.clone()))
            .await
            .unwrap();
        let err = client
            .put_item("messages", second, Some(guard))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn update_add_creates_and_increments() {
        let client = MemoryTableClient::new();
        client.create_table("rooms", "roomId", None);
        client
            .put_item("rooms", item(json!({"roomId": "r1"})), None)
            .await
            .unwrap();
        let key = item(json!({"roomId": "r1"}));
        let updated = client
            .update_item("rooms", &key, Update::default().add("messageCount", 2))
            .await
            .unwrap();
        assert_eq!(updated["messageCount"], json!(2));
        let updated = client
            .update_item("rooms", &key, Update::default().add("messageCount", -5))
            .await
            .unwrap();
        assert_eq!(updated["messageCount"], json!(-3));
    }

    #[tokio::test]
    async fn guarded_update_on_missing_item_conflicts() {
        let client = MemoryTableClient::new();
        client.create_table("rooms", "roomId", None);
        let key = item(json!({"roomId": "ghost"}));
        let update = Update::default()
            .add("participantCount", 1)
            .when(Condition::AttributeExists("roomId".into()));
        let err = client.update_item("rooms", &key, update).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn query_paginates_in_sort_order() {
        let client = client().with_page_size(2);
        for sent_at in [3, 1, 2, 5, 4] {
            client
                .put_item(
                    "messages",
                    item(json!({"roomId": "r1", "sentAt": sent_at, "messageId": format!("m{sent_at}")})),
                    None,
                )
                .await
                .unwrap();
        }
        let mut seen = Vec::new();
        let mut start = None;
        loop {
            let page = client
                .query(
                    "messages",
                    QueryRequest::partition("roomId", json!("r1")).start_after(start.take()),
                )
                .await
                .unwrap();
            seen.extend(page.items.iter().map(|i| i["sentAt"].as_i64().unwrap()));
            match page.last_evaluated_key {
                Some(key) => start = Some(key),
                None => break,
            }
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn index_query_finds_by_attribute() {
        let client = client();
        client
            .put_item(
                "messages",
                item(json!({"roomId": "r1", "sentAt": 1, "messageId": "m1"})),
                None,
            )
            .await
            .unwrap();
        let response = client
            .query(
                "messages",
                QueryRequest::partition("messageId", json!("m1"))
                    .on_index("messageId-index")
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0]["roomId"], json!("r1"));
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let client = client();
        let requests: Vec<WriteRequest> = (0..(MAX_BATCH_ITEMS + 1))
            .map(|i| WriteRequest::Delete(item(json!({"roomId": "r1", "sentAt": i}))))
            .collect();
        let err = client.batch_write("messages", requests).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn sweep_reaps_only_expired_items() {
        let client = client();
        for (sent_at, expires) in [(1, 100), (2, 200)] {
            client
                .put_item(
                    "messages",
                    item(json!({"roomId": "r1", "sentAt": sent_at, "expiresAt": expires})),
                    None,
                )
                .await
                .unwrap();
        }
        assert_eq!(client.sweep_expired("messages", 150), 1);
        assert_eq!(client.item_count("messages"), 1);
    }
}
