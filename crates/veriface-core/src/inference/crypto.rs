//! Model-at-rest cipher: AES-256-CBC with PKCS#7 padding, IV prepended.
//!
//! Layout on the wire/disk: `IV(16) || AES-256-CBC-PKCS7(plaintext)`.
//! The encrypt direction exists for model packaging and round-trip tests;
//! the core only ever decrypts.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use anyhow::{anyhow, bail, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;
/// CBC initialization vector length in bytes.
pub const IV_LEN: usize = 16;

const BLOCK_LEN: usize = 16;

/// Decrypts an IV-prefixed ciphertext into the plaintext model bytes.
///
/// # Errors
///
/// Fails when the payload is too short, not block-aligned, or the padding
/// check rejects it (wrong key or corrupted data).
pub fn decrypt_model_bytes(ciphertext: &[u8], key: &[u8; KEY_LEN]) -> Result<Vec<u8>> {
    if ciphertext.len() <= IV_LEN {
        bail!(
            "ciphertext is {} bytes, needs at least the {IV_LEN}-byte IV plus one block",
            ciphertext.len()
        );
    }
    let (iv, body) = ciphertext.split_at(IV_LEN);
    if body.is_empty() || body.len() % BLOCK_LEN != 0 {
        bail!("ciphertext body of {} bytes is not block-aligned", body.len());
    }

    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| anyhow!("cipher construction failed: {e}"))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| anyhow!("PKCS#7 unpadding failed; wrong key or corrupted model"))
}

/// Encrypts plaintext model bytes, prepending the caller-chosen IV.
#[must_use]
pub fn encrypt_model_bytes(plaintext: &[u8], key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Vec<u8> {
    let cipher = Aes256CbcEnc::new(key.into(), iv.into());
    let body = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let mut out = Vec::with_capacity(IV_LEN + body.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [0x42; KEY_LEN];
    const IV: [u8; IV_LEN] = [0x17; IV_LEN];

    #[test]
    fn roundtrip_reproduces_plaintext() {
        let plaintext: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        let ciphertext = encrypt_model_bytes(&plaintext, &KEY, &IV);
        assert_eq!(&ciphertext[..IV_LEN], &IV);
        let recovered = decrypt_model_bytes(&ciphertext, &KEY).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn roundtrip_block_aligned_plaintext() {
        // Exactly one block of plaintext still gains a full padding block.
        let plaintext = vec![0xAB; BLOCK_LEN];
        let ciphertext = encrypt_model_bytes(&plaintext, &KEY, &IV);
        assert_eq!(ciphertext.len(), IV_LEN + 2 * BLOCK_LEN);
        assert_eq!(decrypt_model_bytes(&ciphertext, &KEY).unwrap(), plaintext);
    }

    #[test]
    fn wrong_key_is_rejected() {
        let ciphertext = encrypt_model_bytes(b"model weights", &KEY, &IV);
        let wrong = [0x43; KEY_LEN];
        assert!(decrypt_model_bytes(&ciphertext, &wrong).is_err());
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        assert!(decrypt_model_bytes(&[0u8; IV_LEN], &KEY).is_err());
        assert!(decrypt_model_bytes(&[0u8; IV_LEN + 7], &KEY).is_err());
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let ciphertext = encrypt_model_bytes(&[], &KEY, &IV);
        assert_eq!(decrypt_model_bytes(&ciphertext, &KEY).unwrap(), Vec::<u8>::new());
    }
}
