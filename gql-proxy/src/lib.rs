//! Cluster-aware dispatch for the search (GraphQL) endpoint.
//!
//! Without shared storage each member only knows its own repositories, so some
//! queries have to be answered by all members together. [`GqlProxy`] classifies
//! each query and hands those operations to a fan-out handler.

pub mod classifier;
pub mod dispatch;
pub mod errors;
pub mod fanout;
pub mod metrics_defs;
pub mod middleware;

#[cfg(test)]
mod testutils;

pub use classifier::QuerySchema;
pub use dispatch::{DispatchTable, Operation};
pub use errors::{GqlProxyError, Result};
pub use middleware::GqlProxy;
