#![cfg(target_os = "linux")]

mod brokered_syscalls;
mod config;
mod error;
mod process;
mod server;

pub use config::BrokerConfig;
pub use error::BrokerError;
pub use process::BrokerProcess;
pub use server::BrokerServer;

// Re-exported from sub-crates, so that launchers only need this one
pub use warden_ipc::{Handle, IpcChannel};
pub use warden_policy::{PathPolicy, PolicyRequest, PolicyVerdict};
pub use warden_worker::BrokerClient;
