use anyhow::Result;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::frame::{open_frame, seal_frame};
use crate::key::ChatKey;

/// Opaque sealing capability used by the chat store.
///
/// The store never sees key material. It calls `seal` on send when a chat has
/// encryption enabled and `open` when a message is rendered.
pub trait EncryptionGateway: Send + Sync {
    fn seal(&self, plaintext: &str) -> Result<String>;
    fn open(&self, ciphertext: &str) -> Result<String>;
}

/// AES-256-GCM gateway. Sealed text is the base64 of a frame from
/// [`seal_frame`].
#[derive(Debug)]
pub struct AesGcmGateway {
    key: ChatKey,
}

impl AesGcmGateway {
    pub fn new(key: ChatKey) -> Self {
        Self { key }
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        Ok(Self::new(ChatKey::from_base64(encoded)?))
    }

    /// Gateway with a fresh random key. Anything sealed with it is lost once
    /// the gateway is dropped.
    pub fn generate() -> Self {
        Self::new(ChatKey::generate())
    }
}

impl EncryptionGateway for AesGcmGateway {
    fn seal(&self, plaintext: &str) -> Result<String> {
        Ok(BASE64.encode(seal_frame(&self.key, plaintext.as_bytes())?))
    }

    fn open(&self, sealed: &str) -> Result<String> {
        let frame = BASE64.decode(sealed)?;
        let plaintext = open_frame(&self.key, &frame)?;
        Ok(String::from_utf8(plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open() {
        let gateway = AesGcmGateway::generate();
        let sealed = gateway.seal("meet at noon").unwrap();
        assert_ne!(sealed, "meet at noon");
        assert_eq!(gateway.open(&sealed).unwrap(), "meet at noon");
    }

    #[test]
    fn same_plaintext_seals_differently() {
        let gateway = AesGcmGateway::generate();
        assert_ne!(gateway.seal("x").unwrap(), gateway.seal("x").unwrap());
    }

    #[test]
    fn open_with_other_key_fails() {
        let a = AesGcmGateway::generate();
        let b = AesGcmGateway::generate();
        let sealed = a.seal("private").unwrap();
        assert!(b.open(&sealed).is_err());
    }

    #[test]
    fn open_garbage_fails() {
        let gateway = AesGcmGateway::generate();
        assert!(gateway.open("not base64 at all!").is_err());
        assert!(gateway.open(&BASE64.encode([0u8; 5])).is_err());
    }
}
