use db::{Item, ItemStore, NewItem, StoreError};
use std::sync::Arc;
use storage::constants::OCTET_STREAM;
use storage::{ChunkStream, ObjectStore, ObjectStream, StorageError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::validation::{validate_content, validate_name};

/// Object handle for a new upload: user-scoped and unguessable
fn new_handle(owner_id: i64) -> String {
    format!("{}/{}", owner_id, Uuid::new_v4())
}

/// Best-effort removal of an object whose item row was never written.
/// Failures leave an orphan and are logged.
async fn compensate(objects: &dyn ObjectStore, handle: &str) {
    match objects.delete(handle).await {
        Ok(()) => warn!("Removed unreferenced object {}", handle),
        Err(e) => error!("Compensating delete of {} failed, object orphaned: {}", handle, e),
    }
}

/// Owns a freshly uploaded object until an item row references it. Dropped
/// while still armed (cancelled request) it schedules the delete on the
/// runtime.
struct ObjectGuard {
    objects: Arc<dyn ObjectStore>,
    handle: Option<String>,
}

impl ObjectGuard {
    fn new(objects: Arc<dyn ObjectStore>, handle: String) -> Self {
        Self {
            objects,
            handle: Some(handle),
        }
    }

    fn disarm(&mut self) {
        self.handle = None;
    }

    async fn cleanup(&mut self) {
        if let Some(handle) = self.handle.take() {
            compensate(self.objects.as_ref(), &handle).await;
        }
    }
}

impl Drop for ObjectGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let objects = self.objects.clone();
                runtime.spawn(async move { compensate(objects.as_ref(), &handle).await });
            }
            Err(_) => error!("No runtime to remove object {}, object orphaned", handle),
        }
    }
}

/// Item operations for an authenticated owner
pub struct KeeperService {
    items: Arc<dyn ItemStore>,
    objects: Arc<dyn ObjectStore>,
}

impl KeeperService {
    pub fn new(items: Arc<dyn ItemStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { items, objects }
    }

    pub async fn create_item(
        &self,
        owner_id: i64,
        name: &str,
        content: Vec<u8>,
    ) -> Result<Item, ServiceError> {
        validate_name(name)?;
        validate_content(&content)?;

        let item = self
            .items
            .create_item(NewItem {
                owner_id,
                name: name.to_string(),
                content,
                file_id: None,
            })
            .await
            .map_err(|e| ServiceError::store("create_item", e))?;

        info!("User {} created item {}", owner_id, name);
        Ok(item)
    }

    /// Replace content only; a referenced object is left as is
    pub async fn update_item(
        &self,
        owner_id: i64,
        name: &str,
        content: Vec<u8>,
    ) -> Result<Item, ServiceError> {
        validate_name(name)?;
        validate_content(&content)?;

        let item = self
            .items
            .update_item(owner_id, name, content)
            .await
            .map_err(|e| ServiceError::store("update_item", e))?;

        info!("User {} updated item {}", owner_id, name);
        Ok(item)
    }

    /// Delete the object first, then the row. A failure in between leaves a
    /// row without object, which a retried delete cleans up.
    pub async fn delete_item(&self, owner_id: i64, name: &str) -> Result<(), ServiceError> {
        validate_name(name)?;

        let file_id = match self.items.get_item(owner_id, name).await {
            Ok(item) => item.file_id,
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(ServiceError::store("delete_item", e)),
        };

        if let Some(handle) = file_id {
            self.objects
                .delete(&handle)
                .await
                .map_err(|e| ServiceError::storage("delete_item", e))?;
            debug!("Deleted object {} of item {}", handle, name);
        }

        self.items
            .delete_item(owner_id, name)
            .await
            .map_err(|e| ServiceError::store("delete_item", e))?;

        info!("User {} deleted item {}", owner_id, name);
        Ok(())
    }

    pub async fn get_item(&self, owner_id: i64, name: &str) -> Result<Item, ServiceError> {
        validate_name(name)?;
        self.items
            .get_item(owner_id, name)
            .await
            .map_err(|e| ServiceError::store("get_item", e))
    }

    pub async fn list_items(&self, owner_id: i64) -> Result<Vec<Item>, ServiceError> {
        self.items
            .list_items(owner_id)
            .await
            .map_err(|e| ServiceError::store("list_items", e))
    }

    /// Store `chunks` as a new object and reference it from the item `name`.
    ///
    /// A new name creates the item. An existing item that already carries a
    /// file gets the new object and content, and its old object is removed.
    /// An existing item without a file is a conflict. Whenever no row ends up
    /// referencing the new object, the object is deleted again.
    ///
    /// Once the object is stored, linking it runs on its own task so a
    /// dropped request cannot interrupt it between the row write and the
    /// cleanup of whichever object lost.
    pub async fn create_item_stream(
        &self,
        owner_id: i64,
        name: &str,
        content: Vec<u8>,
        chunks: ChunkStream,
    ) -> Result<Item, ServiceError> {
        validate_name(name)?;
        validate_content(&content)?;

        let handle = new_handle(owner_id);
        let mut guard = ObjectGuard::new(self.objects.clone(), handle.clone());

        let size = match self.objects.put(&handle, chunks, OCTET_STREAM).await {
            Ok(size) => size,
            Err(e) => {
                guard.cleanup().await;
                return Err(ServiceError::storage("create_item_stream", e));
            }
        };
        debug!("Stored {} bytes at {} for item {}", size, handle, name);

        // the link task owns the object from here on
        guard.disarm();

        let items = self.items.clone();
        let objects = self.objects.clone();
        let item_name = name.to_string();
        let link = tokio::spawn(async move {
            match link_object(items.as_ref(), owner_id, &item_name, content, &handle).await {
                Ok((item, replaced)) => {
                    if let Some(previous) = replaced {
                        remove_replaced(objects.as_ref(), &previous).await;
                    }
                    Ok(item)
                }
                Err(e) => {
                    compensate(objects.as_ref(), &handle).await;
                    Err(e)
                }
            }
        });

        let item = link
            .await
            .map_err(|e| ServiceError::internal("create_item_stream", e))??;

        info!("User {} uploaded item {} ({} bytes)", owner_id, name, size);
        Ok(item)
    }

    /// Item content plus the stream of its object
    pub async fn get_file_stream(
        &self,
        owner_id: i64,
        name: &str,
    ) -> Result<(Vec<u8>, ObjectStream), ServiceError> {
        let item = self.get_item(owner_id, name).await?;

        let Some(handle) = item.file_id else {
            return Err(ServiceError::NotFound(format!("item {} has no file", name)));
        };

        match self.objects.get(&handle).await {
            Ok(stream) => Ok((item.content, stream)),
            Err(StorageError::NotFound(_)) => {
                warn!(
                    "Item {} of user {} references missing object {}",
                    name, owner_id, handle
                );
                Err(ServiceError::NotFound(format!("file of item {}", name)))
            }
            Err(e) => Err(ServiceError::storage("get_file_stream", e)),
        }
    }
}

/// Reference `handle` from the item: create it, or swap the file of an
/// existing file item. Returns the handle the item referenced before.
async fn link_object(
    items: &dyn ItemStore,
    owner_id: i64,
    name: &str,
    content: Vec<u8>,
    handle: &str,
) -> Result<(Item, Option<String>), ServiceError> {
    let created = items
        .create_item(NewItem {
            owner_id,
            name: name.to_string(),
            content: content.clone(),
            file_id: Some(handle.to_string()),
        })
        .await;

    match created {
        Ok(item) => return Ok((item, None)),
        Err(StoreError::AlreadyExists(_)) => {}
        Err(e) => return Err(ServiceError::store("create_item_stream", e)),
    }

    let (item, previous) = items
        .replace_file(owner_id, name, content, handle.to_string())
        .await
        .map_err(|e| match e {
            StoreError::AlreadyExists(_) => {
                ServiceError::AlreadyExists(format!("item {} exists without a file", name))
            }
            other => ServiceError::store("create_item_stream", other),
        })?;

    Ok((item, Some(previous)))
}

/// Remove the object a stream overwrite replaced
async fn remove_replaced(objects: &dyn ObjectStore, handle: &str) {
    match objects.delete(handle).await {
        Ok(()) => debug!("Deleted replaced object {}", handle),
        Err(e) => error!(
            "Failed to delete replaced object {}, object orphaned: {}",
            handle, e
        ),
    }
}
