pub mod api;
pub mod autosave;
pub mod config_io;
pub mod file_api;
pub mod lock;
