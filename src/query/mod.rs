// Typed data operations routed through the interceptor pipeline

pub mod types;

pub use types::*;
