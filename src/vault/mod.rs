pub mod builtin;

pub use builtin::CredentialVault;

/// A stored credential blob could not be opened.
///
/// Callers treat this as fatal for the owning integration and report it as
/// "not connected"; it never aborts the process.
#[derive(Debug, thiserror::Error)]
pub enum DecryptionError {
    #[error("credential blob is not valid base64")]
    Encoding,
    #[error("credential blob is truncated")]
    Truncated,
    #[error("unsupported credential envelope version {0}")]
    UnsupportedVersion(u8),
    #[error("credential blob failed authentication (wrong key or corrupted)")]
    Authentication,
    #[error("credential payload is malformed: {0}")]
    Payload(#[source] serde_json::Error),
}
