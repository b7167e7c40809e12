//! Vault items, scoped per owner

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, NotSet, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use crate::database::Database;
use crate::entity::vaults;
use crate::error::{StoreError, StoreResult};

/// A stored item as seen by its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub owner_id: i64,
    pub name: String,
    pub content: Vec<u8>,
    pub version: Uuid,
    /// Object store handle when the item carries a binary payload
    pub file_id: Option<String>,
}

impl From<vaults::Model> for Item {
    fn from(model: vaults::Model) -> Self {
        Self {
            owner_id: model.owner_id,
            name: model.name,
            content: model.content,
            version: model.version,
            file_id: model.file_id,
        }
    }
}

/// Input of [`ItemStore::create_item`]; the version is assigned by the store
#[derive(Debug, Clone)]
pub struct NewItem {
    pub owner_id: i64,
    pub name: String,
    pub content: Vec<u8>,
    pub file_id: Option<String>,
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert a new item with a fresh version.
    /// `AlreadyExists` when the owner already has an item with this name.
    async fn create_item(&self, item: NewItem) -> StoreResult<Item>;

    /// Replace the content of an existing item and regenerate its version.
    /// Name and file handle are left as they are.
    async fn update_item(&self, owner_id: i64, name: &str, content: Vec<u8>) -> StoreResult<Item>;

    /// Point an item that already carries a file at a new object, replacing
    /// its content and version. Returns the updated item and the handle it
    /// referenced before. `NotFound` when the item is missing, `AlreadyExists`
    /// when it has no file to replace, `Conflict` when a concurrent writer
    /// swapped the file first.
    async fn replace_file(
        &self,
        owner_id: i64,
        name: &str,
        content: Vec<u8>,
        file_id: String,
    ) -> StoreResult<(Item, String)>;

    /// Delete by (owner, name). Deleting a missing item is not an error.
    async fn delete_item(&self, owner_id: i64, name: &str) -> StoreResult<()>;

    async fn get_item(&self, owner_id: i64, name: &str) -> StoreResult<Item>;

    /// All items of an owner, ordered by name
    async fn list_items(&self, owner_id: i64) -> StoreResult<Vec<Item>>;
}

fn not_found(owner_id: i64, name: &str) -> StoreError {
    StoreError::NotFound(format!("item {} of user {}", name, owner_id))
}

/// Write `item` over row `id` only while the row still references
/// `expected`. Concurrent overwrites therefore commit one at a time and every
/// replaced handle is reported to exactly one caller.
pub(crate) async fn swap_file<C>(
    conn: &C,
    id: i64,
    expected: &str,
    item: Item,
) -> StoreResult<Item>
where
    C: ConnectionTrait,
{
    let result = vaults::Entity::update_many()
        .col_expr(vaults::Column::Content, Expr::value(item.content.clone()))
        .col_expr(vaults::Column::FileId, Expr::value(item.file_id.clone()))
        .col_expr(vaults::Column::Version, Expr::value(item.version))
        .col_expr(vaults::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(vaults::Column::Id.eq(id))
        .filter(vaults::Column::FileId.eq(expected))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(StoreError::Conflict(format!(
            "file of item {} of user {} changed concurrently",
            item.name, item.owner_id
        )));
    }
    Ok(item)
}

#[async_trait]
impl ItemStore for Database {
    async fn create_item(&self, item: NewItem) -> StoreResult<Item> {
        let now = Utc::now();
        let owner_id = item.owner_id;
        let name = item.name.clone();

        let row = vaults::ActiveModel {
            id: NotSet,
            owner_id: Set(item.owner_id),
            name: Set(item.name),
            content: Set(item.content),
            version: Set(Uuid::new_v4()),
            file_id: Set(item.file_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let saved = row
            .insert(self.connection())
            .await
            .map_err(|e| StoreError::on_insert(e, format!("item {} of user {}", name, owner_id)))?;

        debug!("Created item {} for user {}", name, owner_id);
        Ok(saved.into())
    }

    async fn update_item(&self, owner_id: i64, name: &str, content: Vec<u8>) -> StoreResult<Item> {
        let txn = self.connection().begin().await?;

        let existing = vaults::Entity::find()
            .filter(vaults::Column::OwnerId.eq(owner_id))
            .filter(vaults::Column::Name.eq(name))
            .one(&txn)
            .await?
            .ok_or_else(|| not_found(owner_id, name))?;

        let mut row: vaults::ActiveModel = existing.into();
        row.content = Set(content);
        row.version = Set(Uuid::new_v4());
        row.updated_at = Set(Utc::now());

        let updated = row.update(&txn).await?;
        txn.commit().await?;

        debug!("Updated item {} for user {}", name, owner_id);
        Ok(updated.into())
    }

    async fn replace_file(
        &self,
        owner_id: i64,
        name: &str,
        content: Vec<u8>,
        file_id: String,
    ) -> StoreResult<(Item, String)> {
        let existing = vaults::Entity::find()
            .filter(vaults::Column::OwnerId.eq(owner_id))
            .filter(vaults::Column::Name.eq(name))
            .one(self.connection())
            .await?
            .ok_or_else(|| not_found(owner_id, name))?;

        let Some(previous) = existing.file_id.clone() else {
            return Err(StoreError::AlreadyExists(format!(
                "item {} of user {} has no file",
                name, owner_id
            )));
        };

        let replacement = Item {
            owner_id,
            name: existing.name.clone(),
            content,
            version: Uuid::new_v4(),
            file_id: Some(file_id),
        };
        let updated = swap_file(self.connection(), existing.id, &previous, replacement).await?;

        debug!("Replaced file of item {} for user {}", name, owner_id);
        Ok((updated, previous))
    }

    async fn delete_item(&self, owner_id: i64, name: &str) -> StoreResult<()> {
        let result = vaults::Entity::delete_many()
            .filter(vaults::Column::OwnerId.eq(owner_id))
            .filter(vaults::Column::Name.eq(name))
            .exec(self.connection())
            .await?;

        debug!(
            "Deleted {} row(s) for item {} of user {}",
            result.rows_affected, name, owner_id
        );
        Ok(())
    }

    async fn get_item(&self, owner_id: i64, name: &str) -> StoreResult<Item> {
        vaults::Entity::find()
            .filter(vaults::Column::OwnerId.eq(owner_id))
            .filter(vaults::Column::Name.eq(name))
            .one(self.connection())
            .await?
            .map(Item::from)
            .ok_or_else(|| not_found(owner_id, name))
    }

    async fn list_items(&self, owner_id: i64) -> StoreResult<Vec<Item>> {
        let rows = vaults::Entity::find()
            .filter(vaults::Column::OwnerId.eq(owner_id))
            .order_by_asc(vaults::Column::Name)
            .all(self.connection())
            .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::PoolConfig;
    use crate::users::UserStore;

    async fn setup() -> (Database, i64, i64) {
        let db = Database::connect("sqlite::memory:", &PoolConfig::single_connection())
            .await
            .unwrap();
        db.bootstrap_schema().await.unwrap();
        let alice = db.save_user("alice@example.com", "h").await.unwrap();
        let bob = db.save_user("bob@example.com", "h").await.unwrap();
        (db, alice, bob)
    }

    fn new_item(owner_id: i64, name: &str, content: &[u8]) -> NewItem {
        NewItem {
            owner_id,
            name: name.to_string(),
            content: content.to_vec(),
            file_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (db, alice, _) = setup().await;

        let created = db.create_item(new_item(alice, "gmail", b"p@ss")).await.unwrap();
        let fetched = db.get_item(alice, "gmail").await.unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.content, b"p@ss");
        assert!(fetched.file_id.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_per_owner() {
        let (db, alice, bob) = setup().await;

        db.create_item(new_item(alice, "gmail", b"one")).await.unwrap();
        let err = db.create_item(new_item(alice, "gmail", b"two")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        // the same name under another owner is fine
        db.create_item(new_item(bob, "gmail", b"bob")).await.unwrap();
        assert_eq!(db.get_item(alice, "gmail").await.unwrap().content, b"one");
    }

    #[tokio::test]
    async fn test_update_regenerates_version() {
        let (db, alice, _) = setup().await;

        let mut item = new_item(alice, "photo", b"meta");
        item.file_id = Some(format!("{}/abc", alice));
        let created = db.create_item(item).await.unwrap();

        let updated = db.update_item(alice, "photo", b"meta2".to_vec()).await.unwrap();
        assert_ne!(updated.version, created.version);
        assert_eq!(updated.content, b"meta2");
        // file handle survives a content update
        assert_eq!(updated.file_id, created.file_id);

        assert_eq!(db.get_item(alice, "photo").await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_missing_item() {
        let (db, alice, _) = setup().await;

        assert!(matches!(
            db.update_item(alice, "missing", b"x".to_vec()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_file() {
        let (db, alice, _) = setup().await;

        let mut item = new_item(alice, "photo", b"v1");
        item.file_id = Some(format!("{}/old", alice));
        let created = db.create_item(item).await.unwrap();

        let (updated, previous) = db
            .replace_file(alice, "photo", b"v2".to_vec(), format!("{}/new", alice))
            .await
            .unwrap();
        assert_eq!(previous, format!("{}/old", alice));
        assert_eq!(updated.file_id.as_deref(), Some(format!("{}/new", alice).as_str()));
        assert_eq!(updated.content, b"v2");
        assert_ne!(updated.version, created.version);
    }

    #[tokio::test]
    async fn test_replace_file_requires_a_file_item() {
        let (db, alice, _) = setup().await;

        db.create_item(new_item(alice, "gmail", b"x")).await.unwrap();
        assert!(matches!(
            db.replace_file(alice, "gmail", b"y".to_vec(), "1/h".to_string()).await,
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(matches!(
            db.replace_file(alice, "missing", b"y".to_vec(), "1/h".to_string()).await,
            Err(StoreError::NotFound(_))
        ));
        // untouched
        let item = db.get_item(alice, "gmail").await.unwrap();
        assert_eq!(item.content, b"x");
        assert!(item.file_id.is_none());
    }

    #[tokio::test]
    async fn test_swap_file_with_stale_handle_conflicts() {
        let (db, alice, _) = setup().await;

        let mut item = new_item(alice, "photo", b"v1");
        item.file_id = Some(format!("{}/current", alice));
        let created = db.create_item(item).await.unwrap();

        let row = vaults::Entity::find()
            .filter(vaults::Column::OwnerId.eq(alice))
            .filter(vaults::Column::Name.eq("photo"))
            .one(db.connection())
            .await
            .unwrap()
            .unwrap();

        let replacement = Item {
            owner_id: alice,
            name: "photo".to_string(),
            content: b"v2".to_vec(),
            version: Uuid::new_v4(),
            file_id: Some(format!("{}/new", alice)),
        };
        let stale = format!("{}/stale", alice);
        assert!(matches!(
            swap_file(db.connection(), row.id, &stale, replacement).await,
            Err(StoreError::Conflict(_))
        ));

        // untouched
        assert_eq!(db.get_item(alice, "photo").await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (db, alice, _) = setup().await;

        db.create_item(new_item(alice, "gmail", b"x")).await.unwrap();
        db.delete_item(alice, "gmail").await.unwrap();
        db.delete_item(alice, "gmail").await.unwrap();

        assert!(matches!(
            db.get_item(alice, "gmail").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_owners_are_isolated() {
        let (db, alice, bob) = setup().await;

        db.create_item(new_item(alice, "gmail", b"x")).await.unwrap();

        assert!(matches!(
            db.get_item(bob, "gmail").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(db.list_items(bob).await.unwrap().is_empty());

        // bob deleting alice's name touches nothing
        db.delete_item(bob, "gmail").await.unwrap();
        assert!(db.get_item(alice, "gmail").await.is_ok());
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_name() {
        let (db, alice, _) = setup().await;

        for name in ["zeta", "alpha", "mid"] {
            db.create_item(new_item(alice, name, name.as_bytes())).await.unwrap();
        }

        let names: Vec<_> = db
            .list_items(alice)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
