#![cfg(target_os = "linux")]

mod error;
mod flags;
mod path;
mod policy;

pub use error::PolicyError;
pub use flags::{validate_request, SUPPORTED_FILE_OPEN_FLAGS};
pub use path::{path_is_sane, OS_PATH_SEPARATOR};
pub use policy::{PathPolicy, PolicyLogCallback, PolicyRequest, PolicyVerdict};
