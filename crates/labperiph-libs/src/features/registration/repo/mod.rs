use crate::shared::error::{LibsError, LibsResult};
use crate::shared::types::LibraryRegistration;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Repository trait for library registrations
#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    /// Store a registration, replacing any previous one with the same name
    async fn upsert(&self, registration: LibraryRegistration) -> LibsResult<()>;

    /// Retrieve a registration by library name
    async fn get(&self, name: &str) -> LibsResult<Option<LibraryRegistration>>;

    /// List all registrations
    async fn list(&self) -> LibsResult<Vec<LibraryRegistration>>;
}

/// In-memory implementation of the registration repository
#[derive(Clone, Default)]
pub struct InMemoryRegistrationRepository {
    storage: Arc<RwLock<HashMap<String, LibraryRegistration>>>,
}

impl InMemoryRegistrationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> LibsError {
    LibsError::Registry("Lock poisoned".to_string())
}

#[async_trait]
impl RegistrationRepository for InMemoryRegistrationRepository {
    async fn upsert(&self, registration: LibraryRegistration) -> LibsResult<()> {
        let mut storage = self.storage.write().map_err(|_| poisoned())?;
        storage.insert(registration.name.clone(), registration);
        Ok(())
    }

    async fn get(&self, name: &str) -> LibsResult<Option<LibraryRegistration>> {
        let storage = self.storage.read().map_err(|_| poisoned())?;
        Ok(storage.get(name).cloned())
    }

    async fn list(&self) -> LibsResult<Vec<LibraryRegistration>> {
        let storage = self.storage.read().map_err(|_| poisoned())?;
        let mut registrations: Vec<_> = storage.values().cloned().collect();
        registrations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(registrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(name: &str, image: &str) -> LibraryRegistration {
        LibraryRegistration {
            name: name.to_string(),
            image: image.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let repo = InMemoryRegistrationRepository::new();
        repo.upsert(registration("foo", "foo:1")).await.unwrap();
        assert_eq!(repo.get("foo").await.unwrap().unwrap().image, "foo:1");
        assert!(repo.get("bar").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_name() {
        let repo = InMemoryRegistrationRepository::new();
        repo.upsert(registration("foo", "foo:1")).await.unwrap();
        repo.upsert(registration("foo", "foo:2")).await.unwrap();
        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].image, "foo:2");
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let repo = InMemoryRegistrationRepository::new();
        repo.upsert(registration("zeta", "z")).await.unwrap();
        repo.upsert(registration("alpha", "a")).await.unwrap();
        let names: Vec<_> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
