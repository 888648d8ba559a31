use uuid::Uuid;

use crate::db::ItemRepository;
use crate::error::{AppError, AppResult};
use crate::models::{CreateItem, Item, ItemList, ListParams, UpdateItem};

pub struct ItemService<R> {
    repository: R,
}

impl<R: ItemRepository> ItemService<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub async fn get_by_id(&mut self, id: Uuid) -> AppResult<Item> {
        self.load(id).await
    }

    pub async fn list(&mut self, params: ListParams) -> AppResult<ItemList> {
        let (items, total) = self.repository.list(params.skip, params.limit).await?;
        Ok(ItemList { items, total })
    }

    pub async fn create(&mut self, input: CreateItem) -> AppResult<Item> {
        let item = self.repository.create(&input).await?;
        tracing::info!("Item created: id={}", item.id);
        Ok(item)
    }

    /// Patch semantics: fields missing from `input` keep their stored values.
    pub async fn update(&mut self, id: Uuid, input: UpdateItem) -> AppResult<Item> {
        let item = self.load(id).await?;
        let changes = input.into_changes();
        let updated = self
            .repository
            .update(&item, &changes)
            .await
            .map_err(|e| vanished(e, id))?;
        tracing::info!("Item updated: id={}", id);
        Ok(updated)
    }

    pub async fn delete(&mut self, id: Uuid) -> AppResult<()> {
        let item = self.load(id).await?;
        self.repository.delete(&item).await?;
        tracing::info!("Item deleted: id={}", id);
        Ok(())
    }

    async fn load(&mut self, id: Uuid) -> AppResult<Item> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Item {} not found", id))
}

// The row was deleted between the existence check and the write.
fn vanished(err: sqlx::Error, id: Uuid) -> AppError {
    match err {
        sqlx::Error::RowNotFound => not_found(id),
        other => AppError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use super::*;
    use crate::models::ItemChanges;

    /// In-memory stand-in that records which operations were called.
    #[derive(Default)]
    struct FakeRepository {
        rows: HashMap<Uuid, Item>,
        calls: Vec<&'static str>,
    }

    impl FakeRepository {
        fn with(items: Vec<Item>) -> Self {
            Self {
                rows: items.into_iter().map(|item| (item.id, item)).collect(),
                calls: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ItemRepository for FakeRepository {
        async fn get_by_id(&mut self, id: Uuid) -> Result<Option<Item>, sqlx::Error> {
            self.calls.push("get_by_id");
            Ok(self.rows.get(&id).cloned())
        }

        async fn list(&mut self, skip: i64, limit: i64) -> Result<(Vec<Item>, i64), sqlx::Error> {
            self.calls.push("list");
            let mut items: Vec<Item> = self.rows.values().cloned().collect();
            items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let page = items
                .into_iter()
                .skip(skip as usize)
                .take(limit as usize)
                .collect();
            Ok((page, self.rows.len() as i64))
        }

        async fn create(&mut self, input: &CreateItem) -> Result<Item, sqlx::Error> {
            self.calls.push("create");
            let now = Utc::now();
            let item = Item {
                id: Uuid::new_v4(),
                name: input.name.clone(),
                description: input.description.clone(),
                created_at: now,
                updated_at: now,
            };
            self.rows.insert(item.id, item.clone());
            Ok(item)
        }

        async fn update(
            &mut self,
            item: &Item,
            changes: &ItemChanges,
        ) -> Result<Item, sqlx::Error> {
            self.calls.push("update");
            let mut updated = item.clone();
            changes.apply_to(&mut updated);
            updated.updated_at = Utc::now().max(item.updated_at + Duration::microseconds(1));
            self.rows.insert(updated.id, updated.clone());
            Ok(updated)
        }

        async fn delete(&mut self, item: &Item) -> Result<(), sqlx::Error> {
            self.calls.push("delete");
            self.rows.remove(&item.id);
            Ok(())
        }
    }

    fn make_item(name: &str, description: Option<&str>) -> Item {
        let now = Utc::now();
        Item {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_get_by_id_returns_item() {
        let item = make_item("Found", None);
        let mut service = ItemService::new(FakeRepository::with(vec![item.clone()]));

        let found = service.get_by_id(item.id).await.unwrap();
        assert_eq!(found.name, "Found");
    }

    #[tokio::test]
    async fn test_get_by_id_missing_is_not_found() {
        let mut service = ItemService::new(FakeRepository::default());
        let id = Uuid::new_v4();

        match service.get_by_id(id).await {
            Err(AppError::NotFound(msg)) => assert_eq!(msg, format!("Item {} not found", id)),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_equal_timestamps() {
        let mut service = ItemService::new(FakeRepository::default());
        let first = service
            .create(CreateItem {
                name: "Widget".to_string(),
                description: None,
            })
            .await
            .unwrap();
        let second = service
            .create(CreateItem {
                name: "Widget".to_string(),
                description: None,
            })
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.created_at, first.updated_at);
    }

    #[tokio::test]
    async fn test_update_keeps_omitted_fields() {
        let item = make_item("Widget", Some("blue"));
        let mut service = ItemService::new(FakeRepository::with(vec![item.clone()]));

        let body: UpdateItem = serde_json::from_str(r#"{"name": "Widget v2"}"#).unwrap();
        let updated = service.update(item.id, body).await.unwrap();

        assert_eq!(updated.name, "Widget v2");
        assert_eq!(updated.description.as_deref(), Some("blue"));
        assert_eq!(updated.created_at, item.created_at);
        assert!(updated.updated_at > item.updated_at);
    }

    #[tokio::test]
    async fn test_update_explicit_null_clears_description() {
        let item = make_item("Widget", Some("blue"));
        let mut service = ItemService::new(FakeRepository::with(vec![item.clone()]));

        let body: UpdateItem = serde_json::from_str(r#"{"description": null}"#).unwrap();
        let updated = service.update(item.id, body).await.unwrap();

        assert_eq!(updated.name, "Widget");
        assert_eq!(updated.description, None);
    }

    /// Collects formatted log lines written while a test runs.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_writes_are_logged() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let item = make_item("Widget", None);
        let mut service = ItemService::new(FakeRepository::with(vec![item.clone()]));

        let body: UpdateItem = serde_json::from_str(r#"{"name": "Widget v2"}"#).unwrap();
        service.update(item.id, body).await.unwrap();
        service.delete(item.id).await.unwrap();

        let output = logs.contents();
        assert!(output.contains(&format!("Item updated: id={}", item.id)), "{}", output);
        assert!(output.contains(&format!("Item deleted: id={}", item.id)), "{}", output);
    }

    #[tokio::test]
    async fn test_update_missing_does_not_write() {
        let mut service = ItemService::new(FakeRepository::default());

        let result = service.update(Uuid::new_v4(), UpdateItem::default()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(service.repository.calls, vec!["get_by_id"]);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let item = make_item("Delete Me", None);
        let mut service = ItemService::new(FakeRepository::with(vec![item.clone()]));

        service.delete(item.id).await.unwrap();
        assert!(matches!(
            service.get_by_id(item.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(item.id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(
            service.repository.calls,
            vec!["get_by_id", "delete", "get_by_id", "get_by_id"]
        );
    }

    #[tokio::test]
    async fn test_list_reports_total_independent_of_page() {
        let mut older = make_item("Older", None);
        older.created_at -= Duration::seconds(10);
        let newer = make_item("Newer", None);
        let mut service = ItemService::new(FakeRepository::with(vec![older, newer]));

        let page = service
            .list(ListParams { skip: 0, limit: 1 })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "Newer");
        assert_eq!(page.total, 2);
    }

    #[test]
    fn test_vanished_row_maps_to_not_found() {
        let id = Uuid::new_v4();
        assert!(matches!(
            vanished(sqlx::Error::RowNotFound, id),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            vanished(sqlx::Error::PoolTimedOut, id),
            AppError::Database(_)
        ));
    }
}
