// Library interface for newsdigest modules
// This allows tests and other binaries to import modules

pub mod decoder;
pub mod delivery;
pub mod entry;
pub mod fetcher;
pub mod pipeline;
pub mod ranking;
pub mod scheduler;
pub mod store;
