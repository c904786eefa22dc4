//! In-memory reference backends.
//!
//! Used by the CLI and by tests. They hold no namespace logic of their
//! own; isolation comes from the scoping proxy wrapped around them.

use super::{str_arg, ResourceError, ResourceHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tessera_types::ResourceName;

type Row = Map<String, Value>;

fn unknown(resource: ResourceName, operation: &str) -> ResourceError {
    ResourceError::UnknownOperation {
        resource,
        operation: operation.to_string(),
    }
}

fn object_arg<'a>(args: &'a Value, field: &str) -> Result<Option<&'a Row>, ResourceError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(m)) => Ok(Some(m)),
        Some(_) => Err(ResourceError::invalid(format!("'{field}' must be an object"))),
    }
}

fn matches(row: &Row, filter: Option<&Row>) -> bool {
    filter.map_or(true, |f| f.iter().all(|(k, v)| row.get(k) == Some(v)))
}

/// Table storage (`db`): rows are JSON objects, filters are equality
/// conjunctions.
///
/// | Operation | Arguments | Result |
/// |-----------|-----------|--------|
/// | `insert` | `table`, `row` or `rows` | `{inserted}` |
/// | `select` | `table`, `where?`, `limit?` | `{rows}` |
/// | `update` | `table`, `where?`, `set` | `{updated}` |
/// | `delete` | `table`, `where?` | `{deleted}` |
#[derive(Debug, Default)]
pub struct MemoryTable {
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemoryTable {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows across all tables, regardless of namespace.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tables.lock().values().map(Vec::len).sum()
    }

    fn insert(&self, args: &Value) -> Result<Value, ResourceError> {
        let table = str_arg(args, "table")?;
        let rows: Vec<Row> = match (args.get("row"), args.get("rows")) {
            (Some(Value::Object(row)), None) => vec![row.clone()],
            (None, Some(Value::Array(rows))) => rows
                .iter()
                .map(|r| {
                    r.as_object()
                        .cloned()
                        .ok_or_else(|| ResourceError::invalid("'rows' must contain objects"))
                })
                .collect::<Result<_, _>>()?,
            _ => {
                return Err(ResourceError::invalid(
                    "insert needs an object 'row' or an array 'rows'",
                ))
            }
        };
        let n = rows.len();
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
        Ok(json!({ "inserted": n }))
    }

    fn select(&self, args: &Value) -> Result<Value, ResourceError> {
        let table = str_arg(args, "table")?;
        let filter = object_arg(args, "where")?;
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        let tables = self.tables.lock();
        let rows: Vec<Value> = tables
            .get(table)
            .into_iter()
            .flatten()
            .filter(|r| matches(r, filter))
            .take(limit)
            .map(|r| Value::Object(r.clone()))
            .collect();
        Ok(json!({ "rows": rows }))
    }

    fn update(&self, args: &Value) -> Result<Value, ResourceError> {
        let table = str_arg(args, "table")?;
        let filter = object_arg(args, "where")?;
        let set = object_arg(args, "set")?
            .ok_or_else(|| ResourceError::invalid("update needs an object 'set'"))?;
        let mut tables = self.tables.lock();
        let mut n = 0;
        for row in tables.get_mut(table).into_iter().flatten() {
            if matches(row, filter) {
                for (k, v) in set {
                    row.insert(k.clone(), v.clone());
                }
                n += 1;
            }
        }
        Ok(json!({ "updated": n }))
    }

    fn delete(&self, args: &Value) -> Result<Value, ResourceError> {
        let table = str_arg(args, "table")?;
        let filter = object_arg(args, "where")?;
        let mut tables = self.tables.lock();
        let mut n = 0;
        if let Some(rows) = tables.get_mut(table) {
            let before = rows.len();
            rows.retain(|r| !matches(r, filter));
            n = before - rows.len();
        }
        Ok(json!({ "deleted": n }))
    }
}

#[async_trait]
impl ResourceHandle for MemoryTable {
    fn resource(&self) -> ResourceName {
        ResourceName::Db
    }

    fn operations(&self) -> &'static [&'static str] {
        &["insert", "select", "update", "delete"]
    }

    async fn invoke(&self, operation: &str, args: Value) -> Result<Value, ResourceError> {
        match operation {
            "insert" => self.insert(&args),
            "select" => self.select(&args),
            "update" => self.update(&args),
            "delete" => self.delete(&args),
            other => Err(unknown(ResourceName::Db, other)),
        }
    }
}

/// Key-value storage (`kv`).
///
/// | Operation | Arguments | Result |
/// |-----------|-----------|--------|
/// | `get` | `key` | `{key, value}` (`value` is null when absent) |
/// | `put` | `key`, `value` | `{key}` |
/// | `delete` | `key` | `{key, deleted}` |
/// | `list` | `prefix?` | `{keys}` |
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryKv {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw keys, regardless of namespace.
    #[must_use]
    pub fn raw_keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl ResourceHandle for MemoryKv {
    fn resource(&self) -> ResourceName {
        ResourceName::Kv
    }

    fn operations(&self) -> &'static [&'static str] {
        &["get", "put", "delete", "list"]
    }

    async fn invoke(&self, operation: &str, args: Value) -> Result<Value, ResourceError> {
        match operation {
            "get" => {
                let key = str_arg(&args, "key")?;
                let value = self.entries.lock().get(key).cloned().unwrap_or(Value::Null);
                Ok(json!({ "key": key, "value": value }))
            }
            "put" => {
                let key = str_arg(&args, "key")?;
                let value = args.get("value").cloned().unwrap_or(Value::Null);
                self.entries.lock().insert(key.to_string(), value);
                Ok(json!({ "key": key }))
            }
            "delete" => {
                let key = str_arg(&args, "key")?;
                let deleted = self.entries.lock().remove(key).is_some();
                Ok(json!({ "key": key, "deleted": deleted }))
            }
            "list" => {
                let prefix = match args.get("prefix") {
                    None | Some(Value::Null) => "",
                    Some(Value::String(p)) => p.as_str(),
                    Some(_) => return Err(ResourceError::invalid("'prefix' must be a string")),
                };
                let keys: Vec<String> = self
                    .entries
                    .lock()
                    .range(prefix.to_string()..)
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .map(|(k, _)| k.clone())
                    .collect();
                Ok(json!({ "keys": keys }))
            }
            other => Err(unknown(ResourceName::Kv, other)),
        }
    }
}

/// FIFO message queues (`queue`), created on first send.
///
/// | Operation | Arguments | Result |
/// |-----------|-----------|--------|
/// | `send` | `queue`, `message` | `{queue, length}` |
/// | `receive` | `queue`, `max?` (default 1) | `{queue, messages}` |
/// | `len` | `queue` | `{queue, length}` |
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<Value>>>,
}

impl MemoryQueue {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw queue names, regardless of namespace.
    #[must_use]
    pub fn raw_queues(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ResourceHandle for MemoryQueue {
    fn resource(&self) -> ResourceName {
        ResourceName::Queue
    }

    fn operations(&self) -> &'static [&'static str] {
        &["send", "receive", "len"]
    }

    async fn invoke(&self, operation: &str, args: Value) -> Result<Value, ResourceError> {
        if !self.operations().contains(&operation) {
            return Err(unknown(ResourceName::Queue, operation));
        }
        let queue = str_arg(&args, "queue")?;
        let mut queues = self.queues.lock();
        match operation {
            "send" => {
                let message = args.get("message").cloned().unwrap_or(Value::Null);
                let q = queues.entry(queue.to_string()).or_default();
                q.push_back(message);
                Ok(json!({ "queue": queue, "length": q.len() }))
            }
            "receive" => {
                let max = args.get("max").and_then(Value::as_u64).unwrap_or(1);
                let max = usize::try_from(max).unwrap_or(usize::MAX);
                let messages: Vec<Value> = match queues.get_mut(queue) {
                    Some(q) => {
                        let n = max.min(q.len());
                        q.drain(..n).collect()
                    }
                    None => Vec::new(),
                };
                Ok(json!({ "queue": queue, "messages": messages }))
            }
            "len" => {
                let length = queues.get(queue).map_or(0, VecDeque::len);
                Ok(json!({ "queue": queue, "length": length }))
            }
            other => Err(unknown(ResourceName::Queue, other)),
        }
    }
}

/// A message accepted by [`OutboxMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    /// Recipient.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
}

/// Notification backend (`email`) that records messages instead of
/// delivering them.
#[derive(Debug, Default)]
pub struct OutboxMailer {
    outbox: Mutex<Vec<SentEmail>>,
}

impl OutboxMailer {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentEmail> {
        self.outbox.lock().clone()
    }
}

#[async_trait]
impl ResourceHandle for OutboxMailer {
    fn resource(&self) -> ResourceName {
        ResourceName::Email
    }

    fn operations(&self) -> &'static [&'static str] {
        &["send"]
    }

    async fn invoke(&self, operation: &str, args: Value) -> Result<Value, ResourceError> {
        if operation != "send" {
            return Err(unknown(ResourceName::Email, operation));
        }
        let email = SentEmail {
            to: str_arg(&args, "to")?.to_string(),
            subject: str_arg(&args, "subject")?.to_string(),
            body: args
                .get("body")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };
        let mut outbox = self.outbox.lock();
        outbox.push(email);
        Ok(json!({ "id": outbox.len(), "accepted": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn table_crud() {
        let db = MemoryTable::new();
        db.invoke("insert", json!({"table": "t", "rows": [{"id": 1, "n": "a"}, {"id": 2, "n": "b"}]}))
            .await
            .expect("insert");

        let r = db
            .invoke("select", json!({"table": "t", "where": {"id": 2}}))
            .await
            .expect("select");
        assert_eq!(r, json!({"rows": [{"id": 2, "n": "b"}]}));

        let r = db
            .invoke("update", json!({"table": "t", "where": {"id": 1}, "set": {"n": "z"}}))
            .await
            .expect("update");
        assert_eq!(r["updated"], 1);

        let r = db
            .invoke("delete", json!({"table": "t"}))
            .await
            .expect("delete");
        assert_eq!(r["deleted"], 2);
        assert_eq!(db.row_count(), 0);
    }

    #[tokio::test]
    async fn table_rejects_bad_shapes() {
        let db = MemoryTable::new();
        let err = db
            .invoke("insert", json!({"table": "t", "row": 5}))
            .await
            .expect_err("row must be object");
        assert!(matches!(err, ResourceError::InvalidArgument(_)));

        let err = db.invoke("drop", json!({})).await.expect_err("unknown op");
        assert!(matches!(err, ResourceError::UnknownOperation { .. }));
    }

    #[tokio::test]
    async fn kv_roundtrip_and_list() {
        let kv = MemoryKv::new();
        kv.invoke("put", json!({"key": "a/1", "value": 10})).await.expect("put");
        kv.invoke("put", json!({"key": "a/2", "value": 20})).await.expect("put");
        kv.invoke("put", json!({"key": "b/1", "value": 30})).await.expect("put");

        let r = kv.invoke("get", json!({"key": "a/2"})).await.expect("get");
        assert_eq!(r["value"], 20);

        let r = kv.invoke("list", json!({"prefix": "a/"})).await.expect("list");
        assert_eq!(r["keys"], json!(["a/1", "a/2"]));

        let r = kv.invoke("get", json!({"key": "missing"})).await.expect("get");
        assert!(r["value"].is_null());
    }

    #[tokio::test]
    async fn queue_fifo() {
        let q = MemoryQueue::new();
        q.invoke("send", json!({"queue": "jobs", "message": 1})).await.expect("send");
        q.invoke("send", json!({"queue": "jobs", "message": 2})).await.expect("send");
        let r = q
            .invoke("receive", json!({"queue": "jobs", "max": 5}))
            .await
            .expect("receive");
        assert_eq!(r["messages"], json!([1, 2]));
        let r = q.invoke("len", json!({"queue": "jobs"})).await.expect("len");
        assert_eq!(r["length"], 0);
    }

    #[tokio::test]
    async fn mailer_records() {
        let m = OutboxMailer::new();
        let r = m
            .invoke("send", json!({"to": "a@example.com", "subject": "hi", "body": "yo"}))
            .await
            .expect("send");
        assert_eq!(r["accepted"], true);
        assert_eq!(m.sent().len(), 1);
        assert_eq!(m.sent()[0].subject, "hi");
    }
}
