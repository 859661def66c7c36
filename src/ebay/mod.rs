pub mod config;
pub mod finding;

pub use finding::FindingClient;
