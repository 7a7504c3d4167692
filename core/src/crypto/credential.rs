// Shared-secret credential: salted hash of the password plus a hash of
// that hash, both advertised on the status line.

use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};

/// Hash algorithm used to derive key material from the password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyHashAlgorithm {
    Sha256,
    #[default]
    Sha512,
}

impl KeyHashAlgorithm {
    /// Token written on the status line, e.g. `SHA512:...`.
    pub fn wire_token(self) -> &'static str {
        match self {
            KeyHashAlgorithm::Sha256 => "SHA256",
            KeyHashAlgorithm::Sha512 => "SHA512",
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            KeyHashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            KeyHashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

const SALT_LEN: usize = 16;

/// Authentication material derived from a password.
///
/// `key = H(password ‖ salt)` and `key_hash = H(key)`. Immutable once
/// constructed; the raw password is not retained.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    algorithm: KeyHashAlgorithm,
    key: Vec<u8>,
    key_hash: Vec<u8>,
    salt: Vec<u8>,
}

impl Credential {
    /// Derive a credential with a random salt and the default algorithm.
    pub fn new(password: &str) -> Self {
        Self::with_algorithm(password, KeyHashAlgorithm::default())
    }

    pub fn with_algorithm(password: &str, algorithm: KeyHashAlgorithm) -> Self {
        let mut salt = vec![0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self::with_salt(password, algorithm, salt)
    }

    /// Deterministic construction from a known salt. The production paths
    /// use [`Credential::new`]; this exists for fixed-vector tests.
    pub fn with_salt(password: &str, algorithm: KeyHashAlgorithm, salt: Vec<u8>) -> Self {
        let mut seed = password.as_bytes().to_vec();
        seed.extend_from_slice(&salt);
        let key = algorithm.digest(&seed);
        let key_hash = algorithm.digest(&key);
        Self {
            algorithm,
            key,
            key_hash,
            salt,
        }
    }

    pub fn algorithm(&self) -> KeyHashAlgorithm {
        self.algorithm
    }

    /// Derived key: the salted password hash. Also the source of the
    /// cipher key for encrypted messages.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Hash of the derived key.
    pub fn key_hash(&self) -> &[u8] {
        &self.key_hash
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }
}

// Key material stays out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("algorithm", &self.algorithm)
            .field("salt", &hex::encode(&self.salt))
            .finish_non_exhaustive()
    }
}
