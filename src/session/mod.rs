// Authentication session management with a memoized user profile

pub mod cache;
pub mod manager;
pub mod relay;
pub mod types;

pub use cache::ProfileCache;
pub use manager::*;
pub use relay::*;
pub use types::*;
