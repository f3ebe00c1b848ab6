/// Application name
pub const APP_NAME: &str = "Aurora";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Bytes of the key digest shown as a fingerprint
pub const FINGERPRINT_SIZE: usize = 8;

/// Joins the two sorted identities before hashing them into a conversation key
pub const PAIR_SEPARATOR: &str = "-";

/// Key derivation context (BLAKE3)
pub const KDF_CONTEXT_CONVERSATION_KEY: &str = "aurora-conversation-key-v1";

/// Default REST API base URL (history endpoint)
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default live channel base URL
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000";
