use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown backend kind: {kind}")]
    UnknownBackend { kind: String },

    #[error("Remote not found: {name}")]
    RemoteNotFound { name: String },

    #[error("Remote {name} is not known (disk unplugged or transport section missing)")]
    RemoteNotKnown { name: String },

    #[error("Directory {path} exists and is not empty")]
    DirectoryNotEmpty { path: String },

    #[error("{path} is already mounted")]
    AlreadyMounted { path: String },

    #[error("No transform metadata stored for repository {repository}; run a cloud sync first")]
    TransformMetadataMissing { repository: String },

    #[error("Remote {remote} holds no copy of the repository")]
    RemoteCopyMissing { remote: String },

    #[error("No snapshot found covering {dir}")]
    SnapshotMissing { dir: String },

    #[error("Failed to launch {tool}: {source}")]
    ToolLaunch {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed ({status}): {output}")]
    ToolFailed {
        tool: &'static str,
        status: std::process::ExitStatus,
        output: String,
    },

    #[error("Per-user data directory unavailable")]
    DataDirUnavailable,
}

pub type Result<T> = std::result::Result<T, Error>;
