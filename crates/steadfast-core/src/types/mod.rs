//! Configuration types for steadfast

mod retry_policy;

pub use retry_policy::{ClassifierKind, RetryPoliciesConfig, RetryPolicy};
