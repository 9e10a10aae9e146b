//! Crate includes reusable utils for services that handle common behavior.
//! Such as initializing the tracing framework and retrying fallible operations.

pub mod logging;
pub mod retry;
