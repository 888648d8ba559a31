use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::Session;
use crate::models::{CreateItem, Item, ItemChanges};

const ITEM_COLUMNS: &str = "id, name, description, created_at, updated_at";

/// Storage operations on items. Absence is a normal result, never an error.
#[async_trait]
pub trait ItemRepository: Send {
    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<Item>, sqlx::Error>;

    /// Newest first. `total` counts the whole table, not the page.
    async fn list(&mut self, skip: i64, limit: i64) -> Result<(Vec<Item>, i64), sqlx::Error>;

    async fn create(&mut self, input: &CreateItem) -> Result<Item, sqlx::Error>;

    async fn update(&mut self, item: &Item, changes: &ItemChanges) -> Result<Item, sqlx::Error>;

    async fn delete(&mut self, item: &Item) -> Result<(), sqlx::Error>;
}

pub struct PgItemRepository<'s> {
    session: &'s mut Session,
}

impl<'s> PgItemRepository<'s> {
    pub fn new(session: &'s mut Session) -> Self {
        Self { session }
    }

    /// Closes the unit of work opened for a write: commit on success,
    /// rollback on failure.
    async fn finish<T: Send>(&mut self, result: Result<T, sqlx::Error>) -> Result<T, sqlx::Error> {
        match result {
            Ok(value) => {
                self.session.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.session.rollback().await {
                    tracing::warn!("Rollback after failed write also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<'s> ItemRepository for PgItemRepository<'s> {
    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<Item>, sqlx::Error> {
        sqlx::query_as::<_, Item>(&format!("SELECT {} FROM items WHERE id = $1", ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(self.session.connection()?)
            .await
    }

    async fn list(&mut self, skip: i64, limit: i64) -> Result<(Vec<Item>, i64), sqlx::Error> {
        let conn = self.session.connection()?;

        // Two independent reads; not a single snapshot under concurrent writes.
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(&mut *conn)
            .await?;

        let items = sqlx::query_as::<_, Item>(&format!(
            "SELECT {} FROM items ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
            ITEM_COLUMNS
        ))
        .bind(limit)
        .bind(skip)
        .fetch_all(conn)
        .await?;

        Ok((items, total))
    }

    async fn create(&mut self, input: &CreateItem) -> Result<Item, sqlx::Error> {
        self.session.begin().await?;
        let result = insert_item(self.session.connection()?, input).await;
        self.finish(result).await
    }

    async fn update(&mut self, item: &Item, changes: &ItemChanges) -> Result<Item, sqlx::Error> {
        self.session.begin().await?;
        let result = update_item(self.session.connection()?, item.id, changes).await;
        self.finish(result).await
    }

    async fn delete(&mut self, item: &Item) -> Result<(), sqlx::Error> {
        self.session.begin().await?;
        let result = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(item.id)
            .execute(self.session.connection()?)
            .await
            .map(|_| ());
        self.finish(result).await
    }
}

async fn insert_item(conn: &mut PgConnection, input: &CreateItem) -> Result<Item, sqlx::Error> {
    // One clock reading for both timestamps so they start out equal.
    sqlx::query_as::<_, Item>(&format!(
        "INSERT INTO items (name, description, created_at, updated_at) \
         SELECT $1, $2, clock.ts, clock.ts FROM (SELECT clock_timestamp() AS ts) AS clock \
         RETURNING {}",
        ITEM_COLUMNS
    ))
    .bind(&input.name)
    .bind(&input.description)
    .fetch_one(conn)
    .await
}

async fn update_item(
    conn: &mut PgConnection,
    id: Uuid,
    changes: &ItemChanges,
) -> Result<Item, sqlx::Error> {
    let mut query = QueryBuilder::<Postgres>::new("UPDATE items SET ");
    {
        let mut set = query.separated(", ");
        if let Some(name) = &changes.name {
            set.push("name = ").push_bind_unseparated(name.clone());
        }
        if let Some(description) = &changes.description {
            set.push("description = ")
                .push_bind_unseparated(description.clone());
        }
        // Strictly increasing even when the clock has not moved since the last write.
        set.push("updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')");
    }
    query.push(" WHERE id = ").push_bind(id);
    query.push(" RETURNING ").push(ITEM_COLUMNS);

    query.build_query_as::<Item>().fetch_one(conn).await
}
