use http::StatusCode;
use thiserror::Error;

pub type Result<T, E = GqlProxyError> = std::result::Result<T, E>;

#[derive(Error, Debug, PartialEq)]
pub enum GqlProxyError {
    #[error("missing query parameter")]
    MissingQuery,

    #[error("failed to read request body: {0}")]
    RequestBody(String),

    #[error("failed to parse query: {0}")]
    Parse(String),

    #[error("field {field} is not defined on type {root}")]
    SchemaViolation { root: String, field: String },

    #[error("failed to compute operation from query")]
    UnknownOperation,

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("fan-out to {0} failed: {1}")]
    Member(String, String),

    #[error("fan-out task failed: {0}")]
    Task(String),

    #[error("failed to merge member responses: {0}")]
    Merge(String),
}

impl GqlProxyError {
    /// Status returned to the caller when this error ends a request.
    pub fn status(&self) -> StatusCode {
        match self {
            GqlProxyError::MissingQuery
            | GqlProxyError::RequestBody(_)
            | GqlProxyError::Parse(_)
            | GqlProxyError::SchemaViolation { .. }
            | GqlProxyError::UnknownOperation => StatusCode::BAD_REQUEST,
            GqlProxyError::Schema(_)
            | GqlProxyError::Member(..)
            | GqlProxyError::Task(_)
            | GqlProxyError::Merge(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
