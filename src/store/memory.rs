//! In-process document store. Nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::RwLock;

use super::{
    compare_sort_keys, project, value_text, Collection, DeleteItem, DeleteOutcome, Document,
    FieldPath, Filter, FindItems, FindOne, ItemProvider, SaveItem, UpdateItem,
};
use crate::err::{Error, Result};

#[derive(Debug, Clone)]
struct StoredItem {
    id: i64,
    doc: Document,
}

#[derive(Debug, Default)]
struct Collections {
    next_id: i64,
    items: HashMap<Collection, Vec<StoredItem>>,
}

#[derive(Debug, Default)]
pub struct MemoryItemProvider {
    inner: RwLock<Collections>,
}

/// A filter ready to be applied, with its pattern compiled once.
enum Matcher<'a> {
    All,
    Equals(&'a FieldPath, &'a str),
    Matches(&'a FieldPath, Regex),
}

impl<'a> Matcher<'a> {
    fn new(filter: &'a Filter) -> Result<Self> {
        Ok(match filter {
            Filter::All => Matcher::All,
            Filter::Equals { path, value } => Matcher::Equals(path, value),
            Filter::Matches { path, pattern } => Matcher::Matches(path, Regex::new(pattern)?),
        })
    }

    fn matches(&self, doc: &Document) -> bool {
        match self {
            Matcher::All => true,
            Matcher::Equals(path, value) => path
                .lookup(doc)
                .and_then(value_text)
                .map_or(false, |text| text == *value),
            Matcher::Matches(path, re) => path
                .lookup(doc)
                .and_then(value_text)
                .map_or(false, |text| re.is_match(&text)),
        }
    }
}

impl MemoryItemProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ItemProvider for MemoryItemProvider {
    async fn find_items(&self, query: FindItems) -> Result<Vec<Document>> {
        log::debug!("find_items on `{}`: {:?}", query.collection, query.filter);
        let matcher = Matcher::new(&query.filter)
            .map_err(super::failed("find_items", query.collection))?;
        let inner = self.inner.read().await;
        let mut found: Vec<&StoredItem> = inner
            .items
            .get(&query.collection)
            .map(|items| items.iter().filter(|item| matcher.matches(&item.doc)).collect())
            .unwrap_or_default();

        match &query.sort {
            Some(sort) => found.sort_by(|a, b| {
                compare_sort_keys(sort.path.lookup(&a.doc), sort.path.lookup(&b.doc), sort.direction)
                    .then(a.id.cmp(&b.id))
            }),
            None => found.sort_by(|a, b| b.id.cmp(&a.id)),
        }

        let limit = query.effective_limit().map_or(usize::MAX, |limit| limit as usize);
        Ok(found
            .into_iter()
            .take(limit)
            .map(|item| project(item.doc.clone(), &query.fields))
            .collect())
    }

    async fn find_one(&self, query: FindOne) -> Result<Option<Document>> {
        log::debug!("find_one on `{}`: {:?}", query.collection, query.filter);
        let matcher = Matcher::new(&query.filter)
            .map_err(super::failed("find_one", query.collection))?;
        let inner = self.inner.read().await;
        Ok(inner.items.get(&query.collection).and_then(|items| {
            items
                .iter()
                .find(|item| matcher.matches(&item.doc))
                .map(|item| item.doc.clone())
        }))
    }

    async fn save_item(&self, item: SaveItem) -> Result<Document> {
        log::debug!("save_item on `{}`", item.collection);
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        let items = inner.items.entry(item.collection).or_default();
        items.push(StoredItem {
            id,
            doc: item.document,
        });
        items
            .iter()
            .find(|stored| stored.id == id)
            .map(|stored| stored.doc.clone())
            .ok_or_else(|| Error::internal("DatabaseError", "insert was not acknowledged"))
            .map_err(super::failed("save_item", item.collection))
    }

    async fn update_item(&self, update: UpdateItem) -> Result<Document> {
        log::debug!("update_item on `{}`: {:?}", update.collection, update.filter);
        let matcher = Matcher::new(&update.filter)
            .map_err(super::failed("update_item", update.collection))?;
        let mut inner = self.inner.write().await;
        let stored = inner
            .items
            .get_mut(&update.collection)
            .and_then(|items| items.iter_mut().find(|item| matcher.matches(&item.doc)))
            .ok_or_else(|| {
                Error::not_found(format!("no document in `{}` matches the update", update.collection))
            })?;
        stored.doc.extend(update.patch);
        Ok(stored.doc.clone())
    }

    async fn delete_item(&self, delete: DeleteItem) -> Result<DeleteOutcome> {
        log::debug!("delete_item on `{}`: {:?}", delete.collection, delete.filter);
        let matcher = Matcher::new(&delete.filter)
            .map_err(super::failed("delete_item", delete.collection))?;
        let mut inner = self.inner.write().await;
        let removed = match inner.items.get_mut(&delete.collection) {
            Some(items) => match items.iter().position(|item| matcher.matches(&item.doc)) {
                Some(index) => {
                    items.remove(index);
                    1
                }
                None => 0,
            },
            None => 0,
        };
        Ok(DeleteOutcome {
            ok: true,
            deleted_count: removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Direction, Sort};
    use serde_json::{json, Value};

    const PEOPLE: Collection = Collection::new("people");

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    async fn seeded() -> MemoryItemProvider {
        let store = MemoryItemProvider::new();
        for (sid, major, gpa) in [("a", "Biology", "3.2"), ("b", "CS", "3.9"), ("c", "Biochem", "3.7")] {
            store
                .save_item(SaveItem {
                    collection: PEOPLE,
                    document: doc(json!({ "sid": sid, "major": major, "gpa": gpa })),
                })
                .await
                .unwrap();
        }
        store
    }

    fn sids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d["sid"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn default_order_is_newest_first() {
        let store = seeded().await;
        let all = store.find_items(FindItems::all(PEOPLE)).await.unwrap();
        assert_eq!(sids(&all), ["c", "b", "a"]);
    }

    #[tokio::test]
    async fn regex_filter_sort_limit_and_projection() {
        let store = seeded().await;
        let query = FindItems::all(PEOPLE)
            .filter(Filter::Matches {
                path: FieldPath::parse("major"),
                pattern: "Bio".into(),
            })
            .sort(Some(Sort {
                path: FieldPath::parse("gpa"),
                direction: Direction::Descending,
            }));
        let found = store.find_items(query.clone()).await.unwrap();
        assert_eq!(sids(&found), ["c", "a"]);

        let limited = store
            .find_items(query.limit(1).fields(vec![FieldPath::parse("sid")]))
            .await
            .unwrap();
        assert_eq!(limited, vec![doc(json!({ "sid": "c" }))]);
    }

    #[tokio::test]
    async fn zero_limit_returns_everything() {
        let store = seeded().await;
        let all = store.find_items(FindItems::all(PEOPLE).limit(0)).await.unwrap();
        assert_eq!(all.len(), 3);

        let mut raw = FindItems::all(PEOPLE);
        raw.limit = Some(0);
        assert_eq!(store.find_items(raw).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn update_merges_top_level_fields() {
        let store = seeded().await;
        let updated = store
            .update_item(UpdateItem {
                collection: PEOPLE,
                filter: Filter::equals("sid", "b"),
                patch: doc(json!({ "gpa": "4.0" })),
            })
            .await
            .unwrap();
        assert_eq!(Value::Object(updated), json!({ "sid": "b", "major": "CS", "gpa": "4.0" }));

        let missing = store
            .update_item(UpdateItem {
                collection: PEOPLE,
                filter: Filter::equals("sid", "zzz"),
                patch: Document::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(missing.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn delete_reports_count() {
        let store = seeded().await;
        let delete = DeleteItem {
            collection: PEOPLE,
            filter: Filter::equals("sid", "a"),
        };
        assert_eq!(
            store.delete_item(delete.clone()).await.unwrap(),
            DeleteOutcome { ok: true, deleted_count: 1 }
        );
        assert_eq!(
            store.delete_item(delete).await.unwrap(),
            DeleteOutcome { ok: true, deleted_count: 0 }
        );
    }

    #[tokio::test]
    async fn bad_pattern_is_invalid_payload() {
        let store = seeded().await;
        let err = store
            .find_items(FindItems::all(PEOPLE).filter(Filter::Matches {
                path: FieldPath::parse("major"),
                pattern: "(".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYLOAD");
    }
}
