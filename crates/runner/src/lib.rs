//! floot runner
//!
//! Executes a resolved spec against its host and records every response
//! in a new run.

pub mod executor;
pub mod template;
pub mod transport;

pub use executor::{EndpointSummary, Executor, RequestSummary, RunSummary};
pub use transport::{HttpTransport, PreparedRequest, Transport};
