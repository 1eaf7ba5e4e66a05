//module tree
pub mod backpressure;
pub mod gate;
pub mod rate_limiter;

//API exports
pub use backpressure::{BackpressureGate, SendOutcome};
pub use gate::{GateDecision, SocketSafetyState};
pub use rate_limiter::{FixedWindowLimiter, GenericRateLimiter, RateLimitOutcome, TypingLimiter};
