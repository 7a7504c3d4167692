// Wire encoding: cleartext and encrypted variants
//
// Status line framing:
//   GNTP/1.0 <TYPE> NONE [<HASH-ALG>:<key-hex>.<salt-hex>]
//   GNTP/1.0 <TYPE> <ALG>:<iv-hex> <HASH-ALG>:<key-hex>.<salt-hex>
//
// In the encrypted variant the whole header block is buffered and
// ciphered as one unit; each binary section is ciphered independently
// and its Length field declares the encrypted size. A cipher failure
// aborts the encode; partial output is never returned.

use thiserror::Error;

use super::types::{BinarySection, GntpMessage, Header, NONE_ENCRYPTION, PROTOCOL_ID, PROTOCOL_VERSION, SEPARATOR};
use crate::crypto::{self, Credential, CryptoError, EncryptionAlgorithm};

/// How a message goes on the wire.
#[derive(Debug, Clone, Copy)]
pub enum WireMode<'a> {
    /// Headers and binary payloads written verbatim. The credential, when
    /// present, only authenticates via the status line.
    Cleartext { credential: Option<&'a Credential> },
    /// Header block and binary payloads ciphered with a key derived from
    /// the credential; the status line carries the algorithm id and IV.
    Encrypted {
        credential: &'a Credential,
        algorithm: EncryptionAlgorithm,
    },
}

/// Local serialization failures. Fatal for the message; never retried.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cipher failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("header contains a line separator: {0}")]
    InvalidHeader(String),
}

impl GntpMessage {
    /// Serialize this message for the given wire mode.
    pub fn encode(&self, mode: WireMode<'_>) -> Result<Vec<u8>, CodecError> {
        for header in &self.headers {
            validate_header(header)?;
        }

        let mut out = Vec::new();
        match mode {
            WireMode::Cleartext { credential } => {
                push_line(
                    &mut out,
                    &status_line(self, NONE_ENCRYPTION.to_string(), credential),
                );
                for header in &self.headers {
                    push_line(&mut out, &header.to_string());
                }
                out.extend_from_slice(SEPARATOR.as_bytes());
                for section in &self.binary_sections {
                    write_binary_section(&mut out, section, None)?;
                }
            }
            WireMode::Encrypted {
                credential,
                algorithm,
            } => {
                let iv = algorithm.random_iv();
                let encryption_field =
                    format!("{}:{}", algorithm.wire_token(), hex::encode(&iv));
                push_line(
                    &mut out,
                    &status_line(self, encryption_field, Some(credential)),
                );

                // buffer every header line, cipher the block as one unit
                let mut block = Vec::new();
                for header in &self.headers {
                    push_line(&mut block, &header.to_string());
                }
                let ciphered = crypto::encrypt(algorithm, credential, &iv, &block)?;
                out.extend_from_slice(&ciphered);
                out.extend_from_slice(SEPARATOR.as_bytes());
                out.extend_from_slice(SEPARATOR.as_bytes());

                for section in &self.binary_sections {
                    write_binary_section(&mut out, section, Some((algorithm, credential, &iv)))?;
                }
            }
        }
        Ok(out)
    }
}

fn validate_header(header: &Header) -> Result<(), CodecError> {
    if header.name.contains(['\r', '\n']) || header.value.contains(['\r', '\n']) {
        return Err(CodecError::InvalidHeader(header.name.clone()));
    }
    Ok(())
}

fn status_line(
    message: &GntpMessage,
    encryption_field: String,
    credential: Option<&Credential>,
) -> String {
    let mut line = format!(
        "{PROTOCOL_ID}/{PROTOCOL_VERSION} {} {encryption_field}",
        message.message_type.wire_token()
    );
    if let Some(credential) = credential {
        line.push(' ');
        line.push_str(credential.algorithm().wire_token());
        line.push(':');
        line.push_str(&hex::encode(credential.key()));
        line.push('.');
        line.push_str(&hex::encode(credential.salt()));
    }
    line
}

fn push_line(out: &mut Vec<u8>, line: &str) {
    out.extend_from_slice(line.as_bytes());
    out.extend_from_slice(SEPARATOR.as_bytes());
}

fn write_binary_section(
    out: &mut Vec<u8>,
    section: &BinarySection,
    cipher: Option<(EncryptionAlgorithm, &Credential, &[u8])>,
) -> Result<(), CodecError> {
    let data = match cipher {
        None => section.data.clone(),
        Some((algorithm, credential, iv)) => {
            crypto::encrypt(algorithm, credential, iv, &section.data)?
        }
    };
    push_line(out, &format!("Identifier: {}", section.id));
    push_line(out, &format!("Length: {}", data.len()));
    out.extend_from_slice(SEPARATOR.as_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(SEPARATOR.as_bytes());
    out.extend_from_slice(SEPARATOR.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyHashAlgorithm;
    use crate::message::{parse_message, MessageType};

    fn bare_message(headers: Vec<Header>, binary_sections: Vec<BinarySection>) -> GntpMessage {
        GntpMessage {
            message_type: MessageType::Register,
            headers,
            binary_sections,
        }
    }

    fn test_credential() -> Credential {
        Credential::with_salt("secret", KeyHashAlgorithm::Sha256, vec![5u8; 16])
    }

    #[test]
    fn test_cleartext_roundtrip() {
        let message = bare_message(
            vec![Header::new("H1", "a"), Header::new("H2", "b")],
            Vec::new(),
        );
        let bytes = message
            .encode(WireMode::Cleartext { credential: None })
            .unwrap();

        let parsed = parse_message(&bytes).unwrap();
        assert_eq!(parsed.message_type, "REGISTER");
        assert_eq!(parsed.encryption, "NONE");
        assert!(parsed.iv_hex.is_none());
        assert!(parsed.key_hex.is_none());
        assert_eq!(parsed.headers, message.headers);
    }

    #[test]
    fn test_cleartext_no_sections_ends_after_blank_line() {
        let message = bare_message(vec![Header::new("H1", "a")], Vec::new());
        let bytes = message
            .encode(WireMode::Cleartext { credential: None })
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.ends_with("\r\n\r\n"));
        assert!(!text.contains("Identifier:"));
    }

    #[test]
    fn test_cleartext_status_line_carries_key_material() {
        let credential = test_credential();
        let message = bare_message(vec![Header::new("H1", "a")], Vec::new());
        let bytes = message
            .encode(WireMode::Cleartext {
                credential: Some(&credential),
            })
            .unwrap();

        let parsed = parse_message(&bytes).unwrap();
        assert_eq!(parsed.encryption, "NONE");
        assert_eq!(parsed.key_hash_algorithm.as_deref(), Some("SHA256"));
        assert_eq!(parsed.key_hex.as_deref(), Some(hex::encode(credential.key()).as_str()));
        assert_eq!(parsed.salt_hex.as_deref(), Some(hex::encode(credential.salt()).as_str()));
    }

    #[test]
    fn test_cleartext_binary_section_length_is_plaintext() {
        let message = bare_message(
            vec![Header::new("H1", "a")],
            vec![BinarySection::new(vec![9u8; 10])],
        );
        let bytes = message
            .encode(WireMode::Cleartext { credential: None })
            .unwrap();
        let text = String::from_utf8_lossy(&bytes);

        assert!(text.contains("Length: 10\r\n"));
    }

    #[test]
    fn test_encrypted_framing() {
        let credential = test_credential();
        let algorithm = EncryptionAlgorithm::Aes;
        let message = bare_message(
            vec![Header::new("H1", "a"), Header::new("H2", "b")],
            vec![BinarySection::new(vec![7u8; 10])],
        );
        let bytes = message
            .encode(WireMode::Encrypted {
                credential: &credential,
                algorithm,
            })
            .unwrap();

        // status line is cleartext and announces algorithm + IV
        let status_end = bytes.windows(2).position(|w| w == b"\r\n").unwrap();
        let status = std::str::from_utf8(&bytes[..status_end]).unwrap();
        let fields: Vec<&str> = status.split(' ').collect();
        assert_eq!(fields[0], "GNTP/1.0");
        assert_eq!(fields[1], "REGISTER");
        let (token, iv_hex) = fields[2].split_once(':').unwrap();
        assert_eq!(token, "AES");
        let iv = hex::decode(iv_hex).unwrap();
        assert_eq!(iv.len(), 16);

        // the ciphered header block is block-aligned; its exact length
        // follows from the plaintext length, which lets us slice it out
        let header_plaintext = b"H1: a\r\nH2: b\r\n";
        let block_len = (header_plaintext.len() / 16 + 1) * 16;
        let block_start = status_end + 2;
        let block = &bytes[block_start..block_start + block_len];
        assert_eq!(
            crypto::decrypt(algorithm, &credential, &iv, block).unwrap(),
            header_plaintext
        );
        assert_eq!(
            &bytes[block_start + block_len..block_start + block_len + 4],
            b"\r\n\r\n"
        );

        // binary section declares the *encrypted* length
        let encrypted_section_len = (10 / 16 + 1) * 16;
        let tail = String::from_utf8_lossy(&bytes[block_start + block_len + 4..]).to_string();
        assert!(tail.contains(&format!("Length: {encrypted_section_len}\r\n")));
        assert!(!tail.contains("Length: 10\r\n"));

        // and the section bytes decrypt back to the payload
        let marker = format!("Length: {encrypted_section_len}\r\n\r\n");
        let data_start = block_start
            + block_len
            + 4
            + tail.find(&marker).unwrap()
            + marker.len();
        let section = &bytes[data_start..data_start + encrypted_section_len];
        assert_eq!(
            crypto::decrypt(algorithm, &credential, &iv, section).unwrap(),
            vec![7u8; 10]
        );
    }

    #[test]
    fn test_encrypted_ivs_are_fresh_per_encode() {
        let credential = test_credential();
        let message = bare_message(vec![Header::new("H1", "a")], Vec::new());
        let mode = WireMode::Encrypted {
            credential: &credential,
            algorithm: EncryptionAlgorithm::Aes,
        };

        let a = message.encode(mode).unwrap();
        let b = message.encode(mode).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_header_with_separator_rejected() {
        let message = bare_message(vec![Header::new("H1", "a\r\nInjected: x")], Vec::new());
        let result = message.encode(WireMode::Cleartext { credential: None });
        assert!(matches!(result, Err(CodecError::InvalidHeader(_))));
    }
}
