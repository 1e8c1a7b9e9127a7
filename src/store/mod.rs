//! Data access layer.
//!
//! An [`ItemProvider`] executes one logical operation against one named
//! collection. Every operation is described by its own descriptor struct so
//! that the GraphQL layer never hands raw query objects to a backend.

pub mod memory;
pub mod postgres;

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::{Config, StoreKind};
use crate::err::{Error, Result};

pub use memory::MemoryItemProvider;
pub use postgres::PgItemProvider;

pub type Document = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Collection(&'static str);

impl Collection {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// A dotted path into a document, e.g. `location.city`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(dotted: &str) -> Self {
        Self(dotted.split('.').map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn lookup<'a>(&self, doc: &'a Document) -> Option<&'a Value> {
        let (first, rest) = self.0.split_first()?;
        rest.iter()
            .try_fold(doc.get(first)?, |value, key| value.as_object()?.get(key))
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    /// Text equality on the value at `path`.
    Equals { path: FieldPath, value: String },
    /// Case-sensitive regular expression containment on the value at `path`.
    Matches { path: FieldPath, pattern: String },
}

impl Filter {
    pub fn equals<S: Into<String>>(path: &str, value: S) -> Self {
        Filter::Equals {
            path: FieldPath::parse(path),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl TryFrom<i32> for Direction {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            1 => Ok(Direction::Ascending),
            -1 => Ok(Direction::Descending),
            other => Err(Error::invalid(format!(
                "sort direction must be 1 or -1, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub path: FieldPath,
    pub direction: Direction,
}

#[derive(Debug, Clone)]
pub struct FindItems {
    pub collection: Collection,
    pub filter: Filter,
    /// `None` orders by internal id, newest first.
    pub sort: Option<Sort>,
    /// `None` or `Some(0)` means unlimited.
    pub limit: Option<u32>,
    /// Empty means every field.
    pub fields: Vec<FieldPath>,
}

impl FindItems {
    pub fn all(collection: Collection) -> Self {
        Self {
            collection,
            filter: Filter::All,
            sort: None,
            limit: None,
            fields: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort(mut self, sort: Option<Sort>) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit).filter(|&limit| limit > 0);
        self
    }

    /// The row cap to apply, if any.
    pub fn effective_limit(&self) -> Option<u32> {
        self.limit.filter(|&limit| limit > 0)
    }

    pub fn fields(mut self, fields: Vec<FieldPath>) -> Self {
        self.fields = fields;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FindOne {
    pub collection: Collection,
    pub filter: Filter,
}

#[derive(Debug, Clone)]
pub struct SaveItem {
    pub collection: Collection,
    pub document: Document,
}

#[derive(Debug, Clone)]
pub struct UpdateItem {
    pub collection: Collection,
    pub filter: Filter,
    /// Top-level fields replacing the stored ones.
    pub patch: Document,
}

#[derive(Debug, Clone)]
pub struct DeleteItem {
    pub collection: Collection,
    pub filter: Filter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub ok: bool,
    pub deleted_count: u64,
}

#[async_trait]
pub trait ItemProvider: Send + Sync {
    async fn find_items(&self, query: FindItems) -> Result<Vec<Document>>;

    async fn find_one(&self, query: FindOne) -> Result<Option<Document>>;

    /// Inserts the document and returns it as read back from the store.
    async fn save_item(&self, item: SaveItem) -> Result<Document>;

    /// Merges the patch into the first matching document and returns the
    /// result, read back by internal id. No match is [`Error::NotFound`].
    async fn update_item(&self, update: UpdateItem) -> Result<Document>;

    /// Deletes at most one matching document.
    async fn delete_item(&self, delete: DeleteItem) -> Result<DeleteOutcome>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

/// Opens the backend named by the configuration. Postgres tables are created
/// up front; the pool itself connects on first use.
pub async fn open(config: &Config, collections: &[Collection]) -> Result<Arc<dyn ItemProvider>> {
    match config.store_kind() {
        StoreKind::Postgres { url, database } => {
            let provider = PgItemProvider::connect_lazy(url, database)?;
            provider.prepare(collections).await?;
            log::info!("Using Postgres document store");
            Ok(Arc::new(provider))
        }
        StoreKind::Memory => {
            log::warn!("No database URL configured, documents are kept in memory only");
            Ok(Arc::new(MemoryItemProvider::new()))
        }
    }
}

/// Logs a failed store call and hands the error on.
pub(crate) fn failed<E: Into<Error>>(op: &'static str, collection: Collection) -> impl FnOnce(E) -> Error {
    move |err| {
        let err = err.into();
        log::error!("{} on `{}` failed: {}", op, collection, err);
        err
    }
}

/// Keeps only the requested fields. Nested paths keep the enclosing objects.
pub fn project(doc: Document, fields: &[FieldPath]) -> Document {
    if fields.is_empty() {
        return doc;
    }
    let mut out = Document::new();
    for path in fields {
        if let Some(value) = path.lookup(&doc) {
            insert_path(&mut out, path.segments(), value.clone());
        }
    }
    out
}

fn insert_path(doc: &mut Document, segments: &[String], value: Value) {
    match segments {
        [] => {}
        [last] => {
            doc.insert(last.clone(), value);
        }
        [head, rest @ ..] => {
            let entry = doc
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Document::new()));
            if let Value::Object(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}

/// Text form of a value as Postgres `#>>` renders it; JSON null has none.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Orders JSON values the way Postgres orders `jsonb`:
/// null < string < number < boolean < array < object.
pub fn compare_json(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::String(_) => 1,
            Value::Number(_) => 2,
            Value::Bool(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .len()
            .cmp(&y.len())
            .then_with(|| {
                x.iter()
                    .zip(y)
                    .map(|(a, b)| compare_json(a, b))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            }),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()).then_with(|| {
            let mut xs: Vec<_> = x.iter().collect();
            let mut ys: Vec<_> = y.iter().collect();
            xs.sort_by(|a, b| a.0.cmp(b.0));
            ys.sort_by(|a, b| a.0.cmp(b.0));
            xs.into_iter()
                .zip(ys)
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| compare_json(va, vb)))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        }),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Sort order for a possibly missing value; missing values sort after
/// everything when ascending, like SQL NULLs.
pub fn compare_sort_keys(a: Option<&Value>, b: Option<&Value>, direction: Direction) -> Ordering {
    let ord = match (a, b) {
        (Some(a), Some(b)) => compare_json(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    match direction {
        Direction::Ascending => ord,
        Direction::Descending => ord.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn lookup_follows_nested_objects() {
        let d = doc(json!({ "name": { "first": "Ann" }, "major": "CS" }));
        assert_eq!(FieldPath::parse("name.first").lookup(&d), Some(&json!("Ann")));
        assert_eq!(FieldPath::parse("major").lookup(&d), Some(&json!("CS")));
        assert_eq!(FieldPath::parse("major.first").lookup(&d), None);
        assert_eq!(FieldPath::parse("phone").lookup(&d), None);
    }

    #[test]
    fn projection_keeps_requested_paths() {
        let d = doc(json!({
            "sid": "1",
            "name": { "first": "Ann", "last": "Lee" },
            "gpa": "3.1"
        }));
        let projected = project(
            d.clone(),
            &[FieldPath::parse("sid"), FieldPath::parse("name.last")],
        );
        assert_eq!(Value::Object(projected), json!({ "sid": "1", "name": { "last": "Lee" } }));
        assert_eq!(project(d.clone(), &[]), d);
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let students = Collection::new("students");
        assert_eq!(FindItems::all(students).limit(0).limit, None);
        assert_eq!(FindItems::all(students).limit(3).effective_limit(), Some(3));
        let mut raw = FindItems::all(students);
        raw.limit = Some(0);
        assert_eq!(raw.effective_limit(), None);
    }

    #[test]
    fn direction_accepts_only_unit_values() {
        assert_eq!(Direction::try_from(1).unwrap(), Direction::Ascending);
        assert_eq!(Direction::try_from(-1).unwrap(), Direction::Descending);
        assert_eq!(Direction::try_from(0).unwrap_err().code(), "INVALID_PAYLOAD");
    }

    #[test]
    fn json_ordering_matches_jsonb() {
        assert_eq!(compare_json(&json!("3.9"), &json!("3.10")), Ordering::Greater);
        assert_eq!(compare_json(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_json(&json!("z"), &json!(1)), Ordering::Less);
        assert_eq!(compare_json(&json!(null), &json!("a")), Ordering::Less);
    }

    #[test]
    fn missing_sort_keys_behave_like_nulls() {
        let v = json!("a");
        assert_eq!(compare_sort_keys(Some(&v), None, Direction::Ascending), Ordering::Less);
        assert_eq!(compare_sort_keys(Some(&v), None, Direction::Descending), Ordering::Greater);
    }
}
