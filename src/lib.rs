pub mod auth;
pub mod client;
pub mod clone;
pub mod config;
pub mod rpc;
pub mod sign;
pub mod storage;
pub mod version;

pub use crate::auth::{verify, AuthError};
pub use crate::clone::{export_settings, restore_settings, CloneInfo, RestoreError, RestoreMode};
pub use crate::rpc::{response, BaseRequest, ControlDaemon, ResponseEnvelope, ServerError};
pub use crate::sign::calc_sign;
pub use crate::version::{check_version, VersionError};
