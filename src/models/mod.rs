pub mod credential;
pub mod request_log;

pub use credential::{Credential, CredentialKind};
pub use request_log::{snapshot_headers, HeaderSnapshot, RequestLogEntry};
