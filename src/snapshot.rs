use tracing::debug;

use crate::crypto;
use crate::journal::Journal;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Serialize and encrypt the journal. The host decides where the bytes go.
pub fn seal(passphrase: &str, journal: &Journal) -> Result<Vec<u8>, SnapshotError> {
    let json = zeroize::Zeroizing::new(serde_json::to_vec(journal)?);
    let sealed = crypto::seal(passphrase, &json)?;
    debug!(entries = journal.len(), bytes = sealed.len(), "journal sealed");
    Ok(sealed)
}

/// Decrypt and parse a journal produced by [`seal`].
pub fn open(passphrase: &str, sealed: &[u8]) -> Result<Journal, SnapshotError> {
    let json = crypto::open(passphrase, sealed)?;
    let mut journal: Journal = serde_json::from_slice(&json)?;
    journal.normalize();
    Ok(journal)
}

/// Plain JSON export, for backups the user reads themselves.
pub fn to_json(journal: &Journal) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string_pretty(journal)?)
}

pub fn from_json(json: &str) -> Result<Journal, SnapshotError> {
    let mut journal: Journal = serde_json::from_str(json)?;
    journal.normalize();
    Ok(journal)
}
