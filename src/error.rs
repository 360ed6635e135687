use std::io;

use thiserror::Error;

/// Malformed address text handed to the frame builder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressFormatError {
    #[error("invalid MAC address '{0}': expected 12 hex digits, optionally colon-separated")]
    InvalidMac(String),

    #[error("invalid IPv4 address '{0}': expected dotted quad")]
    InvalidIpv4(String),
}

/// Failure to put a frame on the wire.
#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("network interface '{0}' is down")]
    InterfaceDown(String),

    #[error("interface '{0}' has no MAC or IPv4 address to announce")]
    MissingAddress(String),

    #[error("insufficient permissions — run as root or grant CAP_NET_RAW/CAP_NET_ADMIN")]
    PermissionDenied,

    #[error("interface '{0}' does not provide an Ethernet channel")]
    UnsupportedChannel(String),

    #[error("send on '{interface}' failed: {source}")]
    Io {
        interface: String,
        #[source]
        source: io::Error,
    },
}

/// A flush command rejected for one interface.
#[derive(Debug, Error)]
pub enum FlushError {
    #[error("insufficient permissions — run as root or grant CAP_NET_RAW/CAP_NET_ADMIN")]
    PermissionDenied,

    #[error("kernel rejected request: {message} (errno {errno})")]
    Kernel { errno: i32, message: String },

    #[error("netlink I/O error: {0}")]
    Io(#[source] io::Error),
}

impl FlushError {
    /// Classify a negated netlink errno.
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc::EPERM | libc::EACCES => FlushError::PermissionDenied,
            _ => FlushError::Kernel {
                errno,
                message: io::Error::from_raw_os_error(errno).to_string(),
            },
        }
    }
}

impl From<io::Error> for FlushError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => FlushError::PermissionDenied,
            _ => match err.raw_os_error() {
                Some(errno) => FlushError::from_errno(errno),
                None => FlushError::Io(err),
            },
        }
    }
}

/// The interface list could not be obtained at all.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("insufficient permissions — run as root or grant CAP_NET_RAW/CAP_NET_ADMIN")]
    PermissionDenied,

    #[error("interface enumeration failed: {0}")]
    Io(#[source] io::Error),

    #[error("interface enumeration failed: {0}")]
    Source(String),
}

impl From<io::Error> for EnumerationError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => EnumerationError::PermissionDenied,
            _ => EnumerationError::Io(err),
        }
    }
}

impl From<FlushError> for EnumerationError {
    fn from(err: FlushError) -> Self {
        match err {
            FlushError::PermissionDenied => EnumerationError::PermissionDenied,
            FlushError::Io(e) => EnumerationError::Io(e),
            other => EnumerationError::Source(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum IfResetError {
    #[error(transparent)]
    AddressFormat(#[from] AddressFormatError),

    #[error(transparent)]
    Transmit(#[from] TransmitError),

    #[error(transparent)]
    Flush(#[from] FlushError),

    #[error(transparent)]
    Enumeration(#[from] EnumerationError),
}

impl IfResetError {
    /// True when the underlying cause is a missing privilege.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            IfResetError::Transmit(TransmitError::PermissionDenied)
                | IfResetError::Flush(FlushError::PermissionDenied)
                | IfResetError::Enumeration(EnumerationError::PermissionDenied)
        )
    }
}

pub type Result<T> = std::result::Result<T, IfResetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eperm_is_permission_denied() {
        assert!(matches!(
            FlushError::from_errno(libc::EPERM),
            FlushError::PermissionDenied
        ));
        assert!(matches!(
            FlushError::from(io::Error::from_raw_os_error(libc::EACCES)),
            FlushError::PermissionDenied
        ));
    }

    #[test]
    fn other_errno_keeps_code() {
        match FlushError::from_errno(libc::EBUSY) {
            FlushError::Kernel { errno, .. } => assert_eq!(errno, libc::EBUSY),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn permission_is_distinct_from_not_found() {
        let denied = IfResetError::from(TransmitError::PermissionDenied);
        let missing = IfResetError::from(TransmitError::InterfaceNotFound("eth9".into()));
        assert!(denied.is_permission_denied());
        assert!(!missing.is_permission_denied());
        assert!(missing.to_string().contains("eth9"));
    }
}
