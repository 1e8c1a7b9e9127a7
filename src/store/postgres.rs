//! Postgres backend. Each collection is a table of `jsonb` documents keyed by
//! a serial id which stands in for the document store's internal id.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{
    failed, project, Collection, DeleteItem, DeleteOutcome, Direction, Document, Filter,
    FindItems, FindOne, ItemProvider, SaveItem, Sort, UpdateItem,
};
use crate::err::{Error, Result};

#[derive(Debug, sqlx::FromRow)]
struct StoredItem {
    doc: Json<Document>,
}

#[derive(Debug, Clone)]
pub struct PgItemProvider {
    pool: PgPool,
}

fn table(collection: Collection) -> String {
    format!("\"{}\"", collection.name())
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::All => {}
        Filter::Equals { path, value } => {
            qb.push(" WHERE doc #>> ");
            qb.push_bind(path.segments().to_vec());
            qb.push("::text[] = ");
            qb.push_bind(value.clone());
        }
        Filter::Matches { path, pattern } => {
            qb.push(" WHERE doc #>> ");
            qb.push_bind(path.segments().to_vec());
            qb.push("::text[] ~ ");
            qb.push_bind(pattern.clone());
        }
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, sort: Option<&Sort>) {
    match sort {
        Some(sort) => {
            qb.push(" ORDER BY doc #> ");
            qb.push_bind(sort.path.segments().to_vec());
            qb.push(match sort.direction {
                Direction::Ascending => "::text[] ASC, id ASC",
                Direction::Descending => "::text[] DESC, id ASC",
            });
        }
        None => {
            qb.push(" ORDER BY id DESC");
        }
    }
}

fn push_limit(qb: &mut QueryBuilder<'_, Postgres>, limit: Option<u32>) {
    if let Some(limit) = limit {
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(limit));
    }
}

impl PgItemProvider {
    /// Builds the pool without connecting; the first query opens a connection.
    pub fn connect_lazy(url: &str, database: Option<&str>) -> Result<Self> {
        let mut options = PgConnectOptions::from_str(url)?;
        if let Some(database) = database {
            options = options.database(database);
        }
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_lazy_with(options);
        Ok(Self { pool })
    }

    /// Creates the collection tables that do not exist yet.
    pub async fn prepare(&self, collections: &[Collection]) -> Result<()> {
        for collection in collections {
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (id BIGSERIAL PRIMARY KEY, doc JSONB NOT NULL)",
                table(*collection)
            );
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(failed("prepare", *collection))?;
            log::info!("Collection `{}` is ready", collection);
        }
        Ok(())
    }

    async fn find_by_id(&self, collection: Collection, id: i64) -> Result<Option<Document>> {
        let sql = format!("SELECT doc FROM {} WHERE id = $1", table(collection));
        let item = sqlx::query_as::<_, StoredItem>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item.map(|item| item.doc.0))
    }
}

#[async_trait]
impl ItemProvider for PgItemProvider {
    async fn find_items(&self, query: FindItems) -> Result<Vec<Document>> {
        log::debug!("find_items on `{}`: {:?}", query.collection, query.filter);
        let mut qb = QueryBuilder::new("SELECT doc FROM ");
        qb.push(table(query.collection));
        push_filter(&mut qb, &query.filter);
        push_order(&mut qb, query.sort.as_ref());
        push_limit(&mut qb, query.effective_limit());
        let items = qb
            .build_query_as::<StoredItem>()
            .fetch_all(&self.pool)
            .await
            .map_err(failed("find_items", query.collection))?;
        Ok(items
            .into_iter()
            .map(|item| project(item.doc.0, &query.fields))
            .collect())
    }

    async fn find_one(&self, query: FindOne) -> Result<Option<Document>> {
        log::debug!("find_one on `{}`: {:?}", query.collection, query.filter);
        let mut qb = QueryBuilder::new("SELECT doc FROM ");
        qb.push(table(query.collection));
        push_filter(&mut qb, &query.filter);
        qb.push(" LIMIT 1");
        let item = qb
            .build_query_as::<StoredItem>()
            .fetch_optional(&self.pool)
            .await
            .map_err(failed("find_one", query.collection))?;
        Ok(item.map(|item| item.doc.0))
    }

    async fn save_item(&self, item: SaveItem) -> Result<Document> {
        log::debug!("save_item on `{}`", item.collection);
        let sql = format!("INSERT INTO {} (doc) VALUES ($1) RETURNING id", table(item.collection));
        let (id,): (i64,) = sqlx::query_as(&sql)
            .bind(Json(&item.document))
            .fetch_one(&self.pool)
            .await
            .map_err(failed("save_item", item.collection))?;
        self.find_by_id(item.collection, id)
            .await
            .and_then(|saved| {
                saved.ok_or_else(|| Error::internal("DatabaseError", "insert was not acknowledged"))
            })
            .map_err(failed("save_item", item.collection))
    }

    async fn update_item(&self, update: UpdateItem) -> Result<Document> {
        log::debug!("update_item on `{}`: {:?}", update.collection, update.filter);
        let name = table(update.collection);
        let mut qb = QueryBuilder::new("UPDATE ");
        qb.push(&name);
        qb.push(" SET doc = doc || ");
        qb.push_bind(Json(update.patch));
        qb.push(" WHERE id = (SELECT id FROM ");
        qb.push(&name);
        push_filter(&mut qb, &update.filter);
        qb.push(" LIMIT 1) RETURNING id");
        let updated: Option<(i64,)> = qb
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(failed("update_item", update.collection))?;
        let (id,) = updated.ok_or_else(|| {
            Error::not_found(format!("no document in `{}` matches the update", update.collection))
        })?;
        self.find_by_id(update.collection, id)
            .await
            .and_then(|doc| {
                doc.ok_or_else(|| Error::not_found(format!("document {} vanished after update", id)))
            })
            .map_err(failed("update_item", update.collection))
    }

    async fn delete_item(&self, delete: DeleteItem) -> Result<DeleteOutcome> {
        log::debug!("delete_item on `{}`: {:?}", delete.collection, delete.filter);
        let name = table(delete.collection);
        let mut qb = QueryBuilder::new("DELETE FROM ");
        qb.push(&name);
        qb.push(" WHERE id = (SELECT id FROM ");
        qb.push(&name);
        push_filter(&mut qb, &delete.filter);
        qb.push(" LIMIT 1)");
        let done = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(failed("delete_item", delete.collection))?;
        Ok(DeleteOutcome {
            ok: true,
            deleted_count: done.rows_affected(),
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|err| {
                log::error!("store ping failed: {}", err);
                Error::from(err)
            })
    }

    async fn close(&self) {
        self.pool.close().await;
        log::info!("Postgres pool closed");
    }
}
