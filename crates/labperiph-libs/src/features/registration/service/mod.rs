use crate::features::registration::repo::RegistrationRepository;
use crate::shared::error::{LibsError, LibsResult};
use crate::shared::types::LibraryRegistration;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Validated catalogue of hostable libraries
pub struct LibraryRegistry {
    repo: Arc<dyn RegistrationRepository>,
}

impl LibraryRegistry {
    pub fn new(repo: Arc<dyn RegistrationRepository>) -> Self {
        Self { repo }
    }

    /// Add a registration after validating it
    pub async fn register(&self, registration: LibraryRegistration) -> LibsResult<()> {
        registration.validate()?;
        info!(lib = %registration.name, image = %registration.image, "Registered library");
        self.repo.upsert(registration).await
    }

    /// Load a JSON manifest. Invalid entries are logged and skipped; the
    /// number of registrations accepted is returned.
    pub async fn load(&self, path: impl AsRef<Path>) -> LibsResult<usize> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            LibsError::Registry(format!("failed to read manifest {}: {e}", path.display()))
        })?;
        let entries = LibraryRegistration::parse_manifest(&contents)?;

        let mut accepted = 0;
        for entry in entries {
            let name = entry.name.clone();
            match self.register(entry).await {
                Ok(()) => accepted += 1,
                Err(error) => {
                    warn!(lib = %name, error = %error, "Skipping invalid library registration")
                }
            }
        }

        info!(manifest = %path.display(), accepted, "Loaded library manifest");
        Ok(accepted)
    }

    pub async fn lookup(&self, name: &str) -> LibsResult<LibraryRegistration> {
        self.repo
            .get(name)
            .await?
            .ok_or_else(|| LibsError::UnregisteredLib(name.to_string()))
    }

    pub async fn list(&self) -> LibsResult<Vec<LibraryRegistration>> {
        self.repo.list().await
    }
}
