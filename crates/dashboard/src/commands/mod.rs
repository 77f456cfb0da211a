pub mod stats;
pub mod watch;
