pub mod engine;
pub mod status;

pub use status::ScopeStatus;
