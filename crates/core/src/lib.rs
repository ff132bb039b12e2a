pub mod capture;
pub mod detection;
pub mod shared;
pub mod watcher;
