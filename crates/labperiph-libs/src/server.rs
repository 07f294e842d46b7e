use crate::features::library_hosting::controller::LibraryHostingController;
use crate::shared::error::LibsError;
use labperiph_proto::v1::libs_service_server::LibsService;
use labperiph_proto::v1::{GetLibRequest, GetLibResponse, KillLibRequest, KillLibResponse};
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct LibsServer {
    controller: Arc<LibraryHostingController>,
}

impl LibsServer {
    pub fn new(controller: Arc<LibraryHostingController>) -> Self {
        Self { controller }
    }
}

fn to_status(error: LibsError) -> Status {
    match error {
        LibsError::InvalidRequest(msg) => Status::invalid_argument(msg),
        other => Status::internal(other.to_string()),
    }
}

#[tonic::async_trait]
impl LibsService for LibsServer {
    async fn get_lib(
        &self,
        request: Request<GetLibRequest>,
    ) -> Result<Response<GetLibResponse>, Status> {
        let req = labperiph_proto::GetLibRequest::from(request.into_inner());
        let response = self.controller.get_lib(req).await.map_err(to_status)?;
        Ok(Response::new(response.into()))
    }

    async fn kill_lib(
        &self,
        request: Request<KillLibRequest>,
    ) -> Result<Response<KillLibResponse>, Status> {
        let req = labperiph_proto::KillLibRequest::from(request.into_inner());
        self.controller.kill_lib(req).await.map_err(to_status)?;
        Ok(Response::new(KillLibResponse {}))
    }
}
