use thiserror::Error;

/// Errors surfaced to bus callers as `{returnValue:false, errorText}`.
///
/// The `Display` text is the wire `errorText`, so existing clients matching on
/// these strings keep working.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrefsError {
    #[error("Missing required parameter '{0}'.")]
    MissingParam(String),
    #[error("{0}")]
    InvalidParam(String),
    #[error("general parameter error")]
    ParamError,
    #[error("permission denied")]
    PermissionDenied,
    #[error("caller identity required for authorization")]
    IdentityUnavailable,
    #[error("permission check unavailable")]
    PermissionCheckUnavailable,
    #[error("illegal value (not a json document)")]
    ValueNotJson,
    #[error("no such key")]
    NoSuchKey,
    #[error("required system resource is missing")]
    ResourceMissing,
    #[error("database error: {0}")]
    Db(String),
    #[error("{0}")]
    Io(String),
    #[error("Unable to create backup file")]
    BackupFailed,
    #[error("unable to restore preference db")]
    RestoreFailed,
    #[error("Unknown method \"{0}\"")]
    UnknownMethod(String),
    #[error("internal error")]
    Internal,
}

impl PrefsError {
    pub fn missing(param: &str) -> Self { Self::MissingParam(param.to_string()) }

    /// Stable numeric code for logging
    pub fn code(&self) -> i32 {
        match self {
            PrefsError::MissingParam(_)
            | PrefsError::InvalidParam(_)
            | PrefsError::ParamError
            | PrefsError::UnknownMethod(_) => -1000,
            PrefsError::PermissionDenied
            | PrefsError::IdentityUnavailable
            | PrefsError::PermissionCheckUnavailable => -1001,
            PrefsError::ValueNotJson => -1002,
            PrefsError::NoSuchKey => -1003,
            PrefsError::ResourceMissing => -1004,
            PrefsError::Db(_) => -1005,
            PrefsError::Io(_) | PrefsError::BackupFailed | PrefsError::RestoreFailed => -1006,
            PrefsError::Internal => -1007,
        }
    }
}

impl From<rusqlite::Error> for PrefsError {
    fn from(e: rusqlite::Error) -> Self {
        PrefsError::Db(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_texts_are_stable() {
        assert_eq!(PrefsError::NoSuchKey.to_string(), "no such key");
        assert_eq!(PrefsError::missing("appId").to_string(), "Missing required parameter 'appId'.");
        assert_eq!(PrefsError::ValueNotJson.to_string(), "illegal value (not a json document)");
        assert_eq!(PrefsError::PermissionDenied.code(), PrefsError::PermissionCheckUnavailable.code());
    }
}
