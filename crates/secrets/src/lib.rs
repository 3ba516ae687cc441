//! Secret resolution chain and salted fingerprinting (§4.6).
//!
//! Resolution order for a requested secret name, per task:
//! 1. a typed [`task::SecretRef`] attached to the task, dispatched by kind
//! 2. the task's target, via its Secrets capability
//! 3. the bare name looked up in the resolver's process environment
//!
//! Resolved values are registered with `sykli-events::redaction` the moment
//! they're produced, before the caller can log or display them.

pub mod fingerprint;
pub mod resolver;
pub mod salt;

pub use fingerprint::compute_secret_fingerprint;
pub use resolver::{ResolvedSecrets, SecretError, SecretResolver, TargetSecretLookup};
pub use salt::SaltConfig;
