use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use labperiph_core::{LibHandle, LibraryRegistration, ServoAddress};

/// Lifecycle of one hosted instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Starting,
    Ready,
    Running,
    Stopped,
}

/// A started container backing a registered library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningLibraryInstance {
    pub id: String,
    pub container_name: String,
    pub registration: LibraryRegistration,
    /// Host port the library is reachable on; 0 when it exposes none.
    pub port: i32,
    pub state: InstanceState,
    pub started_at: DateTime<Utc>,
}

impl RunningLibraryInstance {
    pub fn handle(&self) -> LibHandle {
        LibHandle {
            id: self.id.clone(),
            port: self.port,
        }
    }

    pub fn name(&self) -> &str {
        &self.registration.name
    }
}

/// Request to find (or start) a library
#[derive(Debug, Clone, Default)]
pub struct FindLibRequest {
    pub name: String,
    pub version: String,
    /// Servo the requesting host is wired to, for libraries that need one.
    pub servo: Option<ServoAddress>,
}

impl From<labperiph_proto::GetLibRequest> for FindLibRequest {
    fn from(req: labperiph_proto::GetLibRequest) -> Self {
        Self {
            name: req.name,
            version: req.version,
            servo: req.servo,
        }
    }
}

/// Request to kill a running library instance
#[derive(Debug, Clone)]
pub struct KillLibRequest {
    pub id: String,
}
