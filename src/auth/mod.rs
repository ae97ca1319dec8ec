pub mod middleware;
pub mod role;
pub mod signature;
