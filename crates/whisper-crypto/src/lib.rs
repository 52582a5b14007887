//! Whisper Crypto Library
//!
//! Message sealing for the chat core. The core only depends on the
//! [`EncryptionGateway`] contract; [`AesGcmGateway`] is the shipped
//! implementation, using one shared AES-256-GCM key per local store
//! (distributed out-of-band).

pub mod frame;
pub mod gateway;
pub mod key;

pub use gateway::{AesGcmGateway, EncryptionGateway};
pub use key::ChatKey;
