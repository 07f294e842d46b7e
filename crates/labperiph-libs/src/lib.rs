pub mod config;
pub mod features;
pub mod server;
pub mod shared;

use crate::features::library_hosting::controller::LibraryHostingController;
use crate::features::library_hosting::repo::{ContainerRuntime, InMemoryRunningRepository};
use crate::features::library_hosting::service::{HostingOptions, LibraryHostingService};
use crate::features::registration::repo::InMemoryRegistrationRepository;
use crate::features::registration::service::LibraryRegistry;
use std::sync::Arc;

/// Wire the hosting stack over `runtime` with an empty registry.
pub fn build_hosting(
    runtime: Arc<dyn ContainerRuntime>,
    options: HostingOptions,
) -> (Arc<LibraryRegistry>, Arc<LibraryHostingController>) {
    let registry = Arc::new(LibraryRegistry::new(Arc::new(
        InMemoryRegistrationRepository::new(),
    )));
    let service = Arc::new(LibraryHostingService::new(
        registry.clone(),
        Arc::new(InMemoryRunningRepository::new()),
        runtime,
        options,
    ));
    (registry, Arc::new(LibraryHostingController::new(service)))
}
