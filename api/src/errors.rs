use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {

    #[error("invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    /* kubernetes and cri-o must share major.minor */
    #[error("runtime version {runtime} does not match kubernetes version {kube} (major.minor must be equal)")]
    VersionMismatch { kube: String, runtime: String },

    #[error("malformed os-release: {0}")]
    MalformedOsRelease(String),

    #[error("invalid node role '{0}': valid values are control-plane, worker, auto")]
    InvalidRole(String),

    #[error("hostname '{0}' contains neither 'master', 'control' nor 'worker'; set the node role explicitly")]
    AmbiguousRole(String),

    #[error("unable to read configuration {path}: {source}")]
    ConfigRead { path: String, source: std::io::Error },

    #[error("unable to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
