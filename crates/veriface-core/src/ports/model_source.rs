//! Ports for obtaining encrypted model bytes and the decryption key.

use crate::inference::KEY_LEN;

/// Yields the encrypted bytes for a model by name. The first 16 bytes of the
/// returned payload are the CBC initialization vector.
pub trait ModelByteSource: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the named model is unavailable.
    fn get(&self, name: &str) -> anyhow::Result<Vec<u8>>;
}

/// Yields the AES-256 model key from a side file or platform secret storage.
pub trait KeySource: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the key is missing or malformed.
    fn get(&self) -> anyhow::Result<[u8; KEY_LEN]>;
}
