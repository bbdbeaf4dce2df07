//! Error types for device access.

use thiserror::Error;

/// Errors returned by the frontend, demux and scan table APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// An argument or handle state the operation cannot accept.
    #[error("Bad parameter: {0}")]
    BadParameter(String),

    /// The handle was already released or never opened.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A kernel command failed.
    #[error("{command} failed: {source}")]
    UnexpectedResponse {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// Malformed scan table line (1-based).
    #[error("Syntax error at line {line}: {content:?}")]
    Syntax { line: usize, content: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Section decode error: {0}")]
    Decode(#[from] dvbtap_si::DecodeError),

    /// Every error collected while closing several handles.
    #[error("{} errors: {}", .0.len(), join(.0))]
    Multiple(Vec<Error>),
}

pub type Result<T> = std::result::Result<T, Error>;

fn join(errors: &[Error]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

impl Error {
    pub(crate) fn command(command: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Error::UnexpectedResponse { command, source }
    }

    /// Fold a list of collected errors: none, the single one, or `Multiple`.
    pub(crate) fn collect(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Multiple(errors)),
        }
    }

    /// A read hit a demux ring buffer overrun. Data was lost but the
    /// filter keeps delivering, so the caller can read again.
    pub fn is_buffer_overflow(&self) -> bool {
        match self {
            Error::UnexpectedResponse { source, .. } | Error::Io(source) => is_overflow(source),
            _ => false,
        }
    }
}

#[cfg(unix)]
fn is_overflow(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(nix::errno::Errno::EOVERFLOW as i32)
}

#[cfg(not(unix))]
fn is_overflow(_: &std::io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect() {
        assert!(Error::collect(vec![]).is_ok());
        assert!(matches!(
            Error::collect(vec![Error::NotFound("a".into())]),
            Err(Error::NotFound(_))
        ));

        let err = Error::collect(vec![Error::NotFound("a".into()), Error::NotImplemented("tune")]).unwrap_err();
        assert_eq!(err.to_string(), "2 errors: Not found: a; tune is not implemented");
    }

    #[test]
    #[cfg(unix)]
    fn test_buffer_overflow() {
        let overflow = || std::io::Error::from_raw_os_error(nix::errno::Errno::EOVERFLOW as i32);
        assert!(Error::command("read")(overflow()).is_buffer_overflow());
        assert!(Error::Io(overflow()).is_buffer_overflow());

        let invalid = std::io::Error::from_raw_os_error(nix::errno::Errno::EINVAL as i32);
        assert!(!Error::command("read")(invalid).is_buffer_overflow());
        assert!(!Error::NotFound("filter".into()).is_buffer_overflow());
    }
}
