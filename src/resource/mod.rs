//! Shared CRUD machinery for catalog resources. Each resource keeps its own
//! row types and SQL; the validation, thumbnail handling and error mapping
//! live here once.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::storage::ObjectStorage;

/// Who is asking for a listing. Regular users only see active records and
/// never learn the flag exists; admins see everything, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    User,
    Admin,
}

/// Drafts that may carry an inline thumbnail image. The submitted value is a
/// `data:` URL; by insert time it has been swapped for the storage key.
pub trait Thumbnailed {
    fn take_thumbnail(&mut self) -> Option<String>;
    fn set_thumbnail_key(&mut self, key: String);
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    type Record: Serialize + Send + Sync;
    type Draft: Thumbnailed + Send;
    type Patch: Send;

    /// Plural noun for messages, also the storage folder for thumbnails.
    fn name(&self) -> &'static str;

    async fn insert_many(&self, drafts: Vec<Self::Draft>) -> anyhow::Result<Vec<Self::Record>>;
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Self::Record>>;
    async fn list(&self, visibility: Visibility) -> anyhow::Result<Vec<Self::Record>>;
    async fn update(&self, id: Uuid, patch: Self::Patch) -> anyhow::Result<Option<Self::Record>>;
    async fn delete_many(&self, ids: &[Uuid]) -> anyhow::Result<u64>;
}

/// Request body for bulk deletion, shared by every resource.
#[derive(Debug, Deserialize)]
pub struct DeleteManyRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub status: bool,
    pub length: usize,
    pub documents: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse<T> {
    pub status: bool,
    pub document: T,
}

#[derive(Debug, Serialize)]
pub struct DocumentsResponse<T> {
    pub status: bool,
    pub length: usize,
    pub documents: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub status: bool,
    pub deleted: u64,
}

pub struct ResourceService<S: ResourceStore> {
    store: S,
    storage: Arc<dyn ObjectStorage>,
}

impl<S: ResourceStore> ResourceService<S> {
    pub fn new(store: S, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { store, storage }
    }

    /// Bulk create. Thumbnails are uploaded before any row is written, so a
    /// failed upload aborts the whole request with nothing inserted.
    #[instrument(skip_all, fields(resource = self.store.name()))]
    pub async fn create(&self, mut drafts: Vec<S::Draft>) -> Result<Vec<S::Record>, ApiError> {
        if drafts.is_empty() {
            return Err(ApiError::Validation(format!(
                "Please provide data to create {}.",
                self.store.name()
            )));
        }

        for draft in &mut drafts {
            if let Some(data) = draft.take_thumbnail() {
                let key = self
                    .storage
                    .upload_thumbnail(self.store.name(), &data)
                    .await?;
                draft.set_thumbnail_key(key);
            }
        }

        let records = self.store.insert_many(drafts).await?;
        info!(count = records.len(), "documents created");
        Ok(records)
    }

    /// Listing for the requested audience. User-facing payloads drop the
    /// `active` flag since it is always true for them.
    pub async fn get_all(&self, visibility: Visibility) -> Result<Vec<Value>, ApiError> {
        let records = self.store.list(visibility).await?;
        if records.is_empty() {
            return Err(ApiError::NotFound(format!(
                "No {} found.",
                self.store.name()
            )));
        }

        let mut documents = Vec::with_capacity(records.len());
        for record in &records {
            let mut value = serde_json::to_value(record)
                .map_err(|e| ApiError::Upstream(anyhow::Error::new(e)))?;
            if visibility == Visibility::User {
                if let Some(object) = value.as_object_mut() {
                    object.remove("active");
                }
            }
            documents.push(value);
        }
        Ok(documents)
    }

    pub async fn get_single(&self, id: Uuid) -> Result<S::Record, ApiError> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("No document found with that ID.".into()))
    }

    #[instrument(skip_all, fields(resource = self.store.name(), %id))]
    pub async fn update(&self, id: Uuid, patch: S::Patch) -> Result<S::Record, ApiError> {
        self.store
            .update(id, patch)
            .await?
            .ok_or_else(|| ApiError::NotFound("No document found with that ID.".into()))
    }

    #[instrument(skip_all, fields(resource = self.store.name()))]
    pub async fn delete_many(&self, ids: &[Uuid]) -> Result<u64, ApiError> {
        if ids.is_empty() {
            return Err(ApiError::Validation(
                "Please provide the IDs of the documents to delete.".into(),
            ));
        }

        let deleted = self.store.delete_many(ids).await?;
        if deleted == 0 {
            return Err(ApiError::NotFound(
                "No documents found with the provided IDs.".into(),
            ));
        }

        info!(deleted, "documents deleted");
        Ok(deleted)
    }
}

/// Parses a resource ID out of a path segment with a client-friendly error.
pub fn resource_path_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        ApiError::Validation("Oops! It seems like the document ID provided is invalid.".into())
    })
}
