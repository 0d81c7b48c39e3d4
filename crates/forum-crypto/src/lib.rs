/// Forum Crypto Library
///
/// Credential hashing (Argon2id with a per-password random salt) and the
/// signed session tokens shared by the REST API and the WebSocket gateway.
pub mod password;
pub mod token;
