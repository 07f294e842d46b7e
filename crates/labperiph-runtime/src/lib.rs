pub mod docker;
pub mod escape;
pub mod logs;
pub mod process;
pub mod readiness;

pub use docker::{ContainerRuntime, DockerCli, DockerConfig};
pub use escape::{escape_special_chars, shell_quote};
pub use logs::LogFollower;
pub use process::run_with_timeout;
pub use readiness::wait_until_healthy;
