//! The "any" fallback target (spec Design Notes "Protocol-dispatched
//! targets"): a provided struct whose methods all return the trait's
//! defaults. Used by the registry when a pipeline names a target with no
//! registered driver, so an unrecognized `target:` fails at the capability
//! boundary (`not_supported`) rather than at lookup.

use sykli_secrets::{TargetSecretLookup, TargetSecrets};

use crate::Target;

pub struct AnyTarget;

impl Target for AnyTarget {
    fn name(&self) -> &'static str {
        "any"
    }
}

impl TargetSecrets for AnyTarget {
    fn resolve(&self, _name: &str) -> TargetSecretLookup {
        TargetSecretLookup::NotSupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_is_not_supported() {
        let target = AnyTarget;
        let err = target
            .run(
                &crate::TaskSpec {
                    name: "t".into(),
                    command: "echo".into(),
                    container: None,
                    workdir: std::path::PathBuf::from("."),
                    env: Default::default(),
                    mounts: vec![],
                    cache_mounts: vec![],
                    services: vec![],
                    timeout: None,
                    k8s: None,
                },
                tokio_util::sync::CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, crate::TargetError::NotSupported { .. }));
    }

    #[test]
    fn secrets_not_supported() {
        assert_eq!(AnyTarget.resolve("X"), TargetSecretLookup::NotSupported);
    }
}
