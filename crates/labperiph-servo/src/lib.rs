pub mod features;
pub mod labstation;
pub mod rpc;
pub mod ssh;
pub mod tunnel;

pub use features::servod::controller::DaemonLifecycleController;
pub use features::servod::service::{generate_params, parse_status};
pub use labstation::LabstationServos;
pub use rpc::{RpcCaller, RpcClient, XmlRpcClient};
pub use ssh::{OpenSshConfig, OpenSshPool, SshConnection, SshPool};
pub use tunnel::{TunnelHandle, TunnelProxy};
