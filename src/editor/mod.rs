pub mod command;
pub mod store;

pub use command::Command;
pub use store::{Applied, EditorError, TrackEditor, TrackEvent};
