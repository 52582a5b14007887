//! AES-256-GCM framing: a sealed frame is `nonce || ciphertext || tag`.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use anyhow::{Result, anyhow};

use crate::key::ChatKey;

pub const NONCE_LEN: usize = 12;

/// Encrypt under a fresh random nonce and prepend it.
pub fn seal_frame(key: &ChatKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| anyhow!("seal failed: {}", e))?;

    let mut frame = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    frame.extend_from_slice(&nonce);
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

/// Split off the nonce and decrypt. Fails on a short frame, a wrong key or
/// any tampering.
pub fn open_frame(key: &ChatKey, frame: &[u8]) -> Result<Vec<u8>> {
    if frame.len() < NONCE_LEN {
        return Err(anyhow!("sealed frame too short: {} bytes", frame.len()));
    }
    let (nonce, ciphertext) = frame.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| anyhow!("open failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_carries_nonce_and_tag() {
        let key = ChatKey::generate();
        let frame = seal_frame(&key, b"Hello from Whisper!").unwrap();
        // 16-byte GCM tag
        assert_eq!(frame.len(), NONCE_LEN + 19 + 16);
        assert_eq!(open_frame(&key, &frame).unwrap(), b"Hello from Whisper!");
    }

    #[test]
    fn tampered_frame_rejected() {
        let key = ChatKey::generate();
        let mut frame = seal_frame(&key, b"pay 10").unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert!(open_frame(&key, &frame).is_err());
    }

    #[test]
    fn short_frame_rejected() {
        let key = ChatKey::generate();
        assert!(open_frame(&key, &[0u8; 4]).is_err());
    }
}
