use thiserror::Error;

/// Build number of this installation. The leading digit is the release
/// channel; the remaining digits identify the settings format.
pub const VERSION_CODE: i64 = 100_100;
pub const VERSION_NAME: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("the version_code field is required")]
    MissingVersion,
    #[error("client and server app versions differ (remote {remote}, local {local})")]
    VersionMismatch { remote: i64, local: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppVersion {
    pub code: i64,
    pub name: String,
}

impl AppVersion {
    pub fn current() -> Self {
        Self {
            code: VERSION_CODE,
            name: VERSION_NAME.to_string(),
        }
    }
}

impl Default for AppVersion {
    fn default() -> Self {
        Self::current()
    }
}

/// Drops the leading channel digit of a local build number.
///
/// Remote builds may come from another channel, so only the trailing digits
/// are compared. This assumes every build number keeps exactly one leading
/// channel digit.
pub fn truncate_local_version(local_code: i64) -> String {
    local_code.to_string().chars().skip(1).collect()
}

/// Gate for clone operations: the remote build number must end with the
/// local build number minus its channel digit.
pub fn check_version(remote_code: i64, local_code: i64) -> Result<(), VersionError> {
    if remote_code == 0 {
        return Err(VersionError::MissingVersion);
    }
    let local = truncate_local_version(local_code);
    if !remote_code.to_string().ends_with(&local) {
        return Err(VersionError::VersionMismatch {
            remote: remote_code,
            local: local_code,
        });
    }
    Ok(())
}
