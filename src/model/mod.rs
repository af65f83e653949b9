pub mod checklist;
pub mod config;
pub mod stage;
pub mod track;

pub use checklist::*;
pub use config::*;
pub use stage::*;
pub use track::*;
