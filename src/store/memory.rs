//! In-memory object store, used by tests and `--backend memory` runs.

use super::{ObjectStore, StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
pub struct MemoryObject {
    pub data: Bytes,
    pub content_type: Option<String>,
}

#[derive(Clone)]
pub struct MemoryObjectStore {
    container: String,
    created: Arc<AtomicBool>,
    objects: Arc<RwLock<HashMap<String, MemoryObject>>>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl MemoryObjectStore {
    /// A store whose container already exists.
    pub fn new(container: impl Into<String>) -> Self {
        let store = Self::without_container(container);
        store.created.store(true, Ordering::SeqCst);
        store
    }

    pub fn without_container(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            created: Arc::new(AtomicBool::new(false)),
            objects: Arc::new(RwLock::new(HashMap::new())),
            reads: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `object_exists`/`read_object` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn get(&self, name: &str) -> Option<MemoryObject> {
        self.objects.read().await.get(name).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn container_exists(&self) -> StoreResult<bool> {
        Ok(self.created.load(Ordering::SeqCst))
    }

    async fn create_container(&self) -> StoreResult<()> {
        self.created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn object_exists(&self, name: &str) -> StoreResult<bool> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.read().await.contains_key(name))
    }

    async fn write_object(&self, name: &str, data: Bytes) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.objects.write().await.insert(
            name.to_string(),
            MemoryObject {
                data,
                content_type: None,
            },
        );
        Ok(())
    }

    async fn set_content_type(&self, name: &str, content_type: &str) -> StoreResult<()> {
        match self.objects.write().await.get_mut(name) {
            Some(object) => {
                object.content_type = Some(content_type.to_string());
                Ok(())
            }
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    async fn read_object(&self, name: &str) -> StoreResult<Bytes> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.objects
            .read()
            .await
            .get(name)
            .map(|object| object.data.clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}
