use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use labperiph_proto::v1;
use labperiph_proto::v1::libs_service_client::LibsServiceClient;
use labperiph_proto::{GetLibRequest, GetLibResponse, KillLibRequest};
use std::sync::Arc;
use tokio::sync::Mutex;
use tonic::transport::Channel;
use tonic::Status;

/// Remote library hosting service
#[async_trait]
pub trait LibsBackend: Send + Sync {
    async fn get_lib(&self, request: GetLibRequest) -> Result<GetLibResponse>;

    async fn kill_lib(&self, request: KillLibRequest) -> Result<()>;
}

/// `LibsBackend` over the hosting service's gRPC API
#[derive(Clone)]
pub struct GrpcLibsBackend {
    client: Arc<Mutex<LibsServiceClient<Channel>>>,
}

impl GrpcLibsBackend {
    pub async fn connect(addr: &str) -> Result<Self> {
        let endpoint = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };
        let client = LibsServiceClient::connect(endpoint)
            .await
            .map_err(|e| OrchestratorError::Libs(format!("failed to connect to {addr}: {e}")))?;

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }
}

#[async_trait]
impl LibsBackend for GrpcLibsBackend {
    async fn get_lib(&self, request: GetLibRequest) -> Result<GetLibResponse> {
        let mut client = self.client.lock().await;
        let response = client
            .get_lib(tonic::Request::new(v1::GetLibRequest::from(request)))
            .await
            .map_err(map_tonic_status)?;
        GetLibResponse::try_from(response.into_inner()).map_err(OrchestratorError::Libs)
    }

    async fn kill_lib(&self, request: KillLibRequest) -> Result<()> {
        let mut client = self.client.lock().await;
        client
            .kill_lib(tonic::Request::new(v1::KillLibRequest::from(request)))
            .await
            .map(|_| ())
            .map_err(map_tonic_status)
    }
}

fn map_tonic_status(status: Status) -> OrchestratorError {
    OrchestratorError::Libs(status.to_string())
}
