pub mod types;
pub mod softkms;

// Re-export key types
pub use types::{CreateKeyRequest, CreateKeyResponse, KeyManager, ProtectionLevel};
pub use softkms::{SoftKms, SoftSigner};
