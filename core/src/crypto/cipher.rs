// Symmetric cipher for the encrypted wire variant: CBC mode, PKCS#7
// padding, key taken from the credential's derived key.
//
// Each encryption unit (the buffered header block, each binary section)
// is ciphered independently from the same key/IV, so units can be
// decrypted in isolation.

use rand::RngCore;
use thiserror::Error;

use super::Credential;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Cipher used for encrypted messages, advertised on the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionAlgorithm {
    /// AES-256 in CBC mode.
    #[default]
    Aes,
}

impl EncryptionAlgorithm {
    /// Algorithm id written on the status line.
    pub fn wire_token(self) -> &'static str {
        match self {
            EncryptionAlgorithm::Aes => "AES",
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            EncryptionAlgorithm::Aes => 32,
        }
    }

    pub fn iv_len(self) -> usize {
        match self {
            EncryptionAlgorithm::Aes => 16,
        }
    }

    /// Fresh random IV of the right size for this cipher.
    pub fn random_iv(self) -> Vec<u8> {
        let mut iv = vec![0u8; self.iv_len()];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        iv
    }
}

/// Cipher failures. Fatal for the message being encoded; never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("credential key too short for {algorithm}: have {have} bytes, need {need}")]
    KeyMaterial {
        algorithm: &'static str,
        have: usize,
        need: usize,
    },

    #[error("invalid IV length: have {have} bytes, need {need}")]
    IvLength { have: usize, need: usize },

    #[error("cipher padding failure")]
    Padding,
}

fn cipher_key(
    algorithm: EncryptionAlgorithm,
    credential: &Credential,
) -> Result<&[u8], CryptoError> {
    let need = algorithm.key_len();
    credential
        .key()
        .get(..need)
        .ok_or(CryptoError::KeyMaterial {
            algorithm: algorithm.wire_token(),
            have: credential.key().len(),
            need,
        })
}

fn check_iv(algorithm: EncryptionAlgorithm, iv: &[u8]) -> Result<(), CryptoError> {
    if iv.len() != algorithm.iv_len() {
        return Err(CryptoError::IvLength {
            have: iv.len(),
            need: algorithm.iv_len(),
        });
    }
    Ok(())
}

/// Encrypt one unit of data with the credential's key and the given IV.
pub fn encrypt(
    algorithm: EncryptionAlgorithm,
    credential: &Credential,
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check_iv(algorithm, iv)?;
    let key = cipher_key(algorithm, credential)?;
    match algorithm {
        EncryptionAlgorithm::Aes => {
            let enc = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| CryptoError::IvLength {
                have: iv.len(),
                need: algorithm.iv_len(),
            })?;
            Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(data))
        }
    }
}

/// Decrypt one unit previously produced by [`encrypt`] with the same
/// credential and IV.
pub fn decrypt(
    algorithm: EncryptionAlgorithm,
    credential: &Credential,
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check_iv(algorithm, iv)?;
    let key = cipher_key(algorithm, credential)?;
    match algorithm {
        EncryptionAlgorithm::Aes => {
            let dec = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CryptoError::IvLength {
                have: iv.len(),
                need: algorithm.iv_len(),
            })?;
            dec.decrypt_padded_vec_mut::<Pkcs7>(data)
                .map_err(|_| CryptoError::Padding)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyHashAlgorithm;

    fn test_credential() -> Credential {
        Credential::with_salt("secret", KeyHashAlgorithm::Sha256, vec![3u8; 16])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let credential = test_credential();
        let alg = EncryptionAlgorithm::Aes;
        let iv = alg.random_iv();

        let plaintext = b"Notification-Title: hello\r\n";
        let ciphertext = encrypt(alg, &credential, &iv, plaintext).unwrap();
        assert_ne!(ciphertext.as_slice(), plaintext.as_slice());
        // CBC output is block-aligned and padded
        assert_eq!(ciphertext.len() % 16, 0);
        assert!(ciphertext.len() > plaintext.len());

        let recovered = decrypt(alg, &credential, &iv, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn test_units_with_same_iv_are_independent() {
        let credential = test_credential();
        let alg = EncryptionAlgorithm::Aes;
        let iv = alg.random_iv();

        let a = encrypt(alg, &credential, &iv, b"first unit").unwrap();
        let b = encrypt(alg, &credential, &iv, b"second unit").unwrap();

        assert_eq!(decrypt(alg, &credential, &iv, &a).unwrap(), b"first unit");
        assert_eq!(decrypt(alg, &credential, &iv, &b).unwrap(), b"second unit");
    }

    #[test]
    fn test_bad_iv_length_rejected() {
        let credential = test_credential();
        let result = encrypt(EncryptionAlgorithm::Aes, &credential, &[0u8; 8], b"data");
        assert!(matches!(result, Err(CryptoError::IvLength { have: 8, .. })));
    }

    #[test]
    fn test_garbled_ciphertext_fails_cleanly() {
        let credential = test_credential();
        let alg = EncryptionAlgorithm::Aes;
        let iv = vec![0u8; 16];

        // not block-aligned: cannot be valid CBC output
        let result = decrypt(alg, &credential, &iv, &[1, 2, 3, 4, 5]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let credential = test_credential();
        let alg = EncryptionAlgorithm::Aes;
        let iv = vec![9u8; 16];

        let ciphertext = encrypt(alg, &credential, &iv, b"").unwrap();
        // padding always emits at least one block
        assert_eq!(ciphertext.len(), 16);
        assert_eq!(decrypt(alg, &credential, &iv, &ciphertext).unwrap(), b"");
    }
}
