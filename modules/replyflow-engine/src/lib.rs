pub mod approval;
pub mod commands;
pub mod discovery;
pub mod feedback;
pub mod filter;
pub mod generation;
pub mod publisher;
pub mod scheduler;
pub mod store;
pub mod testing;
pub mod traits;
