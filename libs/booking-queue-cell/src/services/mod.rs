pub mod calculator;
pub mod watcher;

pub use calculator::QueuePositionCalculator;
pub use watcher::{appointment_updates, QueueWatchService};
