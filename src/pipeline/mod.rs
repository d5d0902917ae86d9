// Interceptor pipeline for data operations against the backend

mod chain;
pub mod error;
#[allow(clippy::module_inception)]
pub mod pipeline;
pub mod traits;

pub use chain::{Disposer, InterceptorId};
pub use error::*;
pub use pipeline::*;
pub use traits::*;
