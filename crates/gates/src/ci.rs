//! CI environment detection, used to auto-approve `manual` gates when no
//! human is present to answer a prompt.

/// CI provider environment variables checked when detecting a CI environment.
const CI_VARS: &[&str] = &[
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "JENKINS_URL",
    "CIRCLECI",
    "TRAVIS",
    "BITBUCKET_PIPELINES",
    "AZURE_PIPELINES",
    "TF_BUILD",
    "DRONE",
    "TEAMCITY_VERSION",
];

/// Checks for the generic `CI` variable (truthy unless empty/"0"/"false")
/// plus a list of provider-specific variables used by popular CI systems.
#[must_use]
pub fn is_ci() -> bool {
    if env_truthy("CI") {
        return true;
    }
    CI_VARS.iter().any(|var| std::env::var(var).is_ok())
}

/// A value is truthy unless unset, empty, `"0"`, or `"false"` (case-insensitive).
#[must_use]
pub fn env_truthy(name: &str) -> bool {
    std::env::var(name)
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_ci_var_detected() {
        temp_env::with_var("CI", Some("true"), || assert!(is_ci()));
        temp_env::with_var("CI", Some("false"), || assert!(!is_ci()));
        temp_env::with_var("CI", Some("0"), || assert!(!is_ci()));
    }

    #[test]
    fn provider_specific_var_detected() {
        temp_env::with_vars_unset(CI_VARS.iter().chain(["CI"].iter()), || {
            temp_env::with_var("GITHUB_ACTIONS", Some("true"), || assert!(is_ci()));
        });
    }

    #[test]
    fn env_truthy_semantics() {
        temp_env::with_var("SYKLI_GATE_TEST", Some("yes"), || assert!(env_truthy("SYKLI_GATE_TEST")));
        temp_env::with_var("SYKLI_GATE_TEST", Some(""), || assert!(!env_truthy("SYKLI_GATE_TEST")));
        temp_env::with_var_unset("SYKLI_GATE_TEST", || assert!(!env_truthy("SYKLI_GATE_TEST")));
    }
}
