/// Error types shared by the scoring service and its infrastructure.
///
/// These cover the inference resource and the Redis cache. Service-level errors are
/// defined in the service crate and wrap `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("model initialization failed: {0}")]
    ModelInit(String),

    #[error("classification model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("inference error: {0}")]
    Inference(String),
}
