use std::path::PathBuf;

/// Failures raised by the configuration engine.
///
/// Bulk loading swallows `Parse` and `Io` per file and only surfaces
/// `MalformedConfig`; the locked user-file edit surfaces `Io` and
/// `NoWritableConfigFile` to the caller.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration file: {}", path.display())]
    MalformedConfig { path: PathBuf },

    #[error("failed to parse configuration file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown merge strategy '{0}'")]
    InvalidStrategy(String),

    #[error("no writable location found for the user configuration file")]
    NoWritableConfigFile,

    #[error("invalid up configuration, it should be a list")]
    UpNotAList,

    #[error("invalid up configuration for operation {index}: {reason}")]
    InvalidUpConfig { index: usize, reason: String },

    #[error("invalid up configuration for operation {index}: unknown operation '{name}'")]
    UnknownOperation { index: usize, name: String },
}
