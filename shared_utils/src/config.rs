use thiserror::Error;

use crate::env::MissingEnvVarError;

/// Errors related to application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable required by the application is not set.
    #[error(transparent)]
    MissingEnvVar(#[from] MissingEnvVarError),

    /// A boolean flag holds something other than a recognised spelling.
    #[error("Invalid boolean for {name}: {value:?}")]
    InvalidFlag { name: String, value: String },

    /// A value could not be parsed into the expected type.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
}
