use crate::features::library_hosting::service::LibraryHostingService;
use crate::shared::error::LibsError;
use crate::shared::types::FindLibRequest;
use labperiph_proto::{GetLibRequest, GetLibResponse, KillLibRequest};
use std::sync::Arc;
use tracing::{info, warn};

/// Controller for the library hosting API
pub struct LibraryHostingController {
    service: Arc<LibraryHostingService>,
}

impl LibraryHostingController {
    pub fn new(service: Arc<LibraryHostingService>) -> Self {
        Self { service }
    }

    /// Handle get lib request
    ///
    /// Hosting failures are reported in the response with a structured
    /// reason; only malformed requests are returned as errors.
    pub async fn get_lib(&self, request: GetLibRequest) -> Result<GetLibResponse, LibsError> {
        info!(lib = %request.name, version = %request.version, "Received get lib request");

        match self.service.find_lib(FindLibRequest::from(request)).await {
            Ok(handle) => Ok(GetLibResponse::Success {
                id: handle.id,
                port: handle.port,
            }),
            Err(error) => match error.failure_reason() {
                Some(reason) => {
                    warn!(reason = ?reason, error = %error, "Get lib failed");
                    Ok(GetLibResponse::Failure {
                        reason,
                        message: error.to_string(),
                    })
                }
                None => Err(error),
            },
        }
    }

    /// Handle kill lib request
    pub async fn kill_lib(&self, request: KillLibRequest) -> Result<(), LibsError> {
        info!(lib_id = %request.id, "Received kill lib request");
        self.service.kill_lib(&request.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::library_hosting::repo::fake::FakeRuntime;
    use crate::features::library_hosting::repo::InMemoryRunningRepository;
    use crate::features::library_hosting::service::HostingOptions;
    use crate::features::registration::repo::InMemoryRegistrationRepository;
    use crate::features::registration::service::LibraryRegistry;
    use labperiph_core::LibraryRegistration;
    use labperiph_proto::FailureReason;

    async fn create_test_controller() -> LibraryHostingController {
        controller_with(FakeRuntime::new()).await
    }

    async fn controller_with(runtime: FakeRuntime) -> LibraryHostingController {
        let registry = Arc::new(LibraryRegistry::new(Arc::new(
            InMemoryRegistrationRepository::new(),
        )));
        registry
            .register(LibraryRegistration {
                name: "foo".to_string(),
                image: "foo-lib:1".to_string(),
                api_type: "REST".to_string(),
                owners: vec!["owner@example.com".to_string()],
                description: "test library".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let service = Arc::new(LibraryHostingService::new(
            registry,
            Arc::new(InMemoryRunningRepository::new()),
            Arc::new(runtime),
            HostingOptions::default(),
        ));
        LibraryHostingController::new(service)
    }

    #[tokio::test]
    async fn test_get_lib_success() {
        let controller = create_test_controller().await;
        let response = controller.get_lib(GetLibRequest::new("foo")).await.unwrap();
        assert_eq!(
            response,
            GetLibResponse::Success {
                id: "foo.0".to_string(),
                port: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_get_lib_unregistered_is_structured() {
        let controller = create_test_controller().await;
        let response = controller.get_lib(GetLibRequest::new("bar")).await.unwrap();
        assert!(matches!(
            response,
            GetLibResponse::Failure {
                reason: FailureReason::UnregisteredLib,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_get_lib_empty_name_is_error() {
        let controller = create_test_controller().await;
        assert!(controller.get_lib(GetLibRequest::new("")).await.is_err());
    }

    #[tokio::test]
    async fn test_kill_lib() {
        let controller = create_test_controller().await;
        controller.get_lib(GetLibRequest::new("foo")).await.unwrap();
        controller
            .kill_lib(KillLibRequest {
                id: "foo.0".to_string(),
            })
            .await
            .unwrap();
        controller
            .kill_lib(KillLibRequest { id: String::new() })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_kill_lib_succeeds_when_container_already_gone() {
        let controller = controller_with(FakeRuntime::failing_remove()).await;
        controller.get_lib(GetLibRequest::new("foo")).await.unwrap();
        controller
            .kill_lib(KillLibRequest {
                id: "foo.0".to_string(),
            })
            .await
            .unwrap();

        let response = controller.get_lib(GetLibRequest::new("foo")).await.unwrap();
        assert_eq!(
            response,
            GetLibResponse::Success {
                id: "foo.1".to_string(),
                port: 0,
            }
        );
    }
}
