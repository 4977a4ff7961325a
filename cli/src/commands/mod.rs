pub mod backup;
pub mod check;
pub mod last_synced;
pub mod mount;
pub mod recover;
pub mod restore;
pub mod sync;
