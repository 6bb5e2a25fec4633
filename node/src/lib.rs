pub mod config;
pub mod executor;
pub mod local;
pub mod mock;
pub mod node;
mod process;
#[cfg(feature = "ssh")]
pub mod ssh;
pub mod types;

pub use config::SshConfig;
pub use executor::{CommandExecutor, NodeError, NodeResult};
pub use local::LocalExecutor;
pub use mock::{MockExecutor, MockResponse};
pub use node::{MountUsage, Node};
pub use types::{shell_quote, ExecuteRequest, ExecuteResult};

#[cfg(feature = "ssh")]
pub use ssh::SshExecutor;

pub mod prelude {
    pub use crate::config::*;
    pub use crate::executor::*;
    pub use crate::node::*;
    pub use crate::types::*;

    #[cfg(feature = "ssh")]
    pub use crate::ssh::*;
}
