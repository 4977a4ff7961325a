pub mod backend;
pub mod error;
pub mod exec;
pub mod mounts;
pub mod paths;
pub mod remote;
pub mod repository;
pub mod source;
pub mod sync_state;
pub mod util;

pub use backend::{Backend, BackendKind, CheckMode, RestoreReport};
pub use error::{Error, Result};
pub use paths::DataPaths;
pub use remote::{EnvironmentProbe, Remote, RemoteKind};
pub use repository::{InitOutcome, Repository, SaveReport, SyncOutcome};
pub use source::Source;
pub use sync_state::SyncStateStore;
