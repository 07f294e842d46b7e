// Serde mirrors of the library hosting messages, used by callers that speak
// JSON (the orchestrator's command payloads) rather than protobuf.

use labperiph_core::ServoAddress;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetLibRequest {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub servo: Option<ServoAddress>,
}

impl GetLibRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            servo: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    UnregisteredLib,
    ContainerStartError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum GetLibResponse {
    Success { id: String, port: i32 },
    Failure { reason: FailureReason, message: String },
}

impl GetLibResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, GetLibResponse::Success { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KillLibRequest {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KillLibResponse {}
