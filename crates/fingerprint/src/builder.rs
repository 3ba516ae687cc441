//! Chainable digest accumulation over the fields that make up a task's
//! fingerprint.

use sha2::{Digest, Sha256};

use crate::InputFile;

/// Accumulates a task's cacheable surface into one SHA-256 digest. Every
/// `add_*` call writes a trailing separator byte so adjacent fields can
/// never collide (`["ab", "c"]` digests differently from `["a", "bc"]`).
pub struct DigestBuilder {
    hasher: Sha256,
}

impl Default for DigestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { hasher: Sha256::new() }
    }

    pub fn add_image(&mut self, image: &str) -> &mut Self {
        self.write(image.as_bytes())
    }

    pub fn add_command(&mut self, command: &str) -> &mut Self {
        self.write(command.as_bytes())
    }

    /// Env pairs, sorted by key for determinism (§4.1).
    pub fn add_env(&mut self, env: &std::collections::BTreeMap<String, String>) -> &mut Self {
        for (key, value) in env {
            self.hasher.update(key.as_bytes());
            self.hasher.update([b'=']);
            self.hasher.update(value.as_bytes());
            self.hasher.update([0u8]);
        }
        self
    }

    /// Sorted (path, content digest) pairs.
    pub fn add_inputs(&mut self, inputs: &[InputFile]) -> &mut Self {
        for input in inputs {
            self.hasher.update(input.path.as_bytes());
            self.hasher.update([b'=']);
            self.hasher.update(input.digest.as_bytes());
            self.hasher.update([0u8]);
        }
        self
    }

    /// Sorted output declaration names.
    pub fn add_outputs(&mut self, output_names: &[String]) -> &mut Self {
        for name in output_names {
            self.write(name.as_bytes());
        }
        self
    }

    /// Sorted upstream artifact fingerprints (from `input_from` producers).
    pub fn add_upstream_fingerprints(&mut self, fingerprints: &[String]) -> &mut Self {
        for fp in fingerprints {
            self.write(fp.as_bytes());
        }
        self
    }

    fn write(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update(bytes);
        self.hasher.update([0u8]);
        self
    }

    #[must_use]
    pub fn finalize(self) -> String {
        format!("sha256:{}", hex::encode(self.hasher.finalize()))
    }
}
