pub mod check;
pub mod linked;
pub mod progress;
pub mod reorder;
pub mod track_ops;
