#![cfg(target_os = "linux")]

#[macro_use]
mod error;
mod bootstrap;
mod client;
mod filter;
mod limits;
mod status;
mod threads;

pub use bootstrap::{BootstrapConfig, ProcessKind, SandboxBootstrap, SandboxState};
pub use client::BrokerClient;
pub use error::FilterError;
pub use filter::{current_seccomp_mode, seccomp_filter_loadable, DenylistFilter, SyscallFilter};
pub use status::SandboxStatus;
