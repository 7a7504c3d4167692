// Credential derivation and the symmetric cipher behind the encrypted
// wire variant.

mod cipher;
mod credential;

pub use cipher::{decrypt, encrypt, CryptoError, EncryptionAlgorithm};
pub use credential::{Credential, KeyHashAlgorithm};
