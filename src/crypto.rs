use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{self, Argon2, Params};
use rand::RngCore;
use zeroize::Zeroizing;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
/// Format tag written in the clear and bound to the ciphertext as associated data.
const HEADER: &[u8] = b"OVTRK\x00\x01";
const HEADER_LEN: usize = HEADER.len();

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed: wrong passphrase or corrupted data")]
    Decryption,
    #[error("not a sealed journal")]
    InvalidFormat,
}

/// Derive a 256-bit key from a passphrase and salt using Argon2id.
fn derive_key(passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let params = Params::new(65536, 3, 1, Some(KEY_LEN)).map_err(|_| CryptoError::KeyDerivation)?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut *key)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(key)
}

/// Encrypt `plaintext` under `passphrase`.
/// Layout: header (7) || salt (32) || nonce (12) || ciphertext
pub fn seal(passphrase: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::Encryption)?;
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: HEADER,
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    let mut sealed = Vec::with_capacity(HEADER_LEN + SALT_LEN + NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(HEADER);
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Whether `bytes` starts with the sealed-journal header.
pub fn is_sealed(bytes: &[u8]) -> bool {
    bytes.starts_with(HEADER)
}

/// Decrypt data produced by [`seal`]. The plaintext is wiped on drop.
pub fn open(passphrase: &str, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if !is_sealed(sealed) || sealed.len() < HEADER_LEN + SALT_LEN + NONCE_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let body = &sealed[HEADER_LEN..];
    let (salt, rest) = body.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(passphrase, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::Decryption)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: HEADER,
            },
        )
        .map_err(|_| CryptoError::Decryption)?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open() {
        let sealed = seal("test-passphrase-123", b"bbt 97.8").unwrap();
        assert!(is_sealed(&sealed));
        let opened = open("test-passphrase-123", &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"bbt 97.8");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let sealed = seal("correct", b"secret data").unwrap();
        assert!(matches!(open("wrong", &sealed), Err(CryptoError::Decryption)));
    }

    #[test]
    fn tampered_header_is_rejected() {
        let mut sealed = seal("pass", b"data").unwrap();
        sealed[0] = b'X';
        assert!(matches!(open("pass", &sealed), Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn truncated_input_fails() {
        assert!(matches!(open("any", &[0u8; 10]), Err(CryptoError::InvalidFormat)));
        assert!(matches!(open("any", HEADER), Err(CryptoError::InvalidFormat)));
    }
}
