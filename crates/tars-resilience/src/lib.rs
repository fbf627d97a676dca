pub mod breaker;
pub mod error;
pub mod health;
pub mod registry;
pub mod retry;

pub use breaker::{BreakerSettings, CircuitBreaker};
pub use error::{BreakerError, RetryError};
pub use health::HealthCache;
pub use registry::BreakerRegistry;
pub use retry::{retry, RetryPolicy};
