use crate::protocol;
use crate::v1;
use crate::v1::get_lib_response::failure::Reason;
use crate::v1::get_lib_response::{Failure, Outcome, Success};
use labperiph_core::ServoAddress;
use std::convert::TryFrom;

// ServoAddress
impl From<ServoAddress> for v1::ServoAddress {
    fn from(addr: ServoAddress) -> Self {
        Self {
            host: addr.host,
            port: addr.port,
        }
    }
}

impl From<v1::ServoAddress> for ServoAddress {
    fn from(addr: v1::ServoAddress) -> Self {
        Self {
            host: addr.host,
            port: addr.port,
        }
    }
}

// GetLibRequest
impl From<protocol::GetLibRequest> for v1::GetLibRequest {
    fn from(req: protocol::GetLibRequest) -> Self {
        Self {
            name: req.name,
            version: req.version,
            servo: req.servo.map(Into::into),
        }
    }
}

impl From<v1::GetLibRequest> for protocol::GetLibRequest {
    fn from(req: v1::GetLibRequest) -> Self {
        Self {
            name: req.name,
            version: req.version,
            servo: req.servo.map(Into::into),
        }
    }
}

// FailureReason
impl From<protocol::FailureReason> for Reason {
    fn from(reason: protocol::FailureReason) -> Self {
        match reason {
            protocol::FailureReason::UnregisteredLib => Reason::UnregisteredLib,
            protocol::FailureReason::ContainerStartError => Reason::ContainerStartError,
        }
    }
}

impl TryFrom<Reason> for protocol::FailureReason {
    type Error = String;

    fn try_from(reason: Reason) -> Result<Self, Self::Error> {
        match reason {
            Reason::UnregisteredLib => Ok(protocol::FailureReason::UnregisteredLib),
            Reason::ContainerStartError => Ok(protocol::FailureReason::ContainerStartError),
            Reason::Unspecified => Err("failure reason is unspecified".to_string()),
        }
    }
}

// GetLibResponse
impl From<protocol::GetLibResponse> for v1::GetLibResponse {
    fn from(res: protocol::GetLibResponse) -> Self {
        let outcome = match res {
            protocol::GetLibResponse::Success { id, port } => Outcome::Success(Success { id, port }),
            protocol::GetLibResponse::Failure { reason, message } => Outcome::Failure(Failure {
                reason: Reason::from(reason) as i32,
                message,
            }),
        };
        Self {
            outcome: Some(outcome),
        }
    }
}

impl TryFrom<v1::GetLibResponse> for protocol::GetLibResponse {
    type Error = String;

    fn try_from(res: v1::GetLibResponse) -> Result<Self, Self::Error> {
        match res.outcome.ok_or("outcome is missing")? {
            Outcome::Success(success) => Ok(protocol::GetLibResponse::Success {
                id: success.id,
                port: success.port,
            }),
            Outcome::Failure(failure) => {
                let reason = Reason::try_from(failure.reason)
                    .map_err(|_| format!("invalid failure reason: {}", failure.reason))?;
                Ok(protocol::GetLibResponse::Failure {
                    reason: reason.try_into()?,
                    message: failure.message,
                })
            }
        }
    }
}

// KillLibRequest / KillLibResponse
impl From<protocol::KillLibRequest> for v1::KillLibRequest {
    fn from(req: protocol::KillLibRequest) -> Self {
        Self { id: req.id }
    }
}

impl From<v1::KillLibRequest> for protocol::KillLibRequest {
    fn from(req: v1::KillLibRequest) -> Self {
        Self { id: req.id }
    }
}

impl From<protocol::KillLibResponse> for v1::KillLibResponse {
    fn from(_: protocol::KillLibResponse) -> Self {
        Self {}
    }
}

impl From<v1::KillLibResponse> for protocol::KillLibResponse {
    fn from(_: v1::KillLibResponse) -> Self {
        Self {}
    }
}
