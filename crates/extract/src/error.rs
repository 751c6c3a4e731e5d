use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ErrorKind {
    #[display("could not read filesystem entry: {_0:?}")]
    Io(#[error(not(source))] PathBuf),
    #[display("invalid exclude pattern: {_0}")]
    Pattern(#[error(not(source))] String),
    #[display("exiftool invocation failed: {_0}")]
    Subprocess(#[error(not(source))] String),
    #[display("exiftool produced unparsable output")]
    InvalidOutput,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Subprocess(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_format_their_context() {
        assert_eq!(ErrorKind::Pattern("[".to_string()).to_string(), "invalid exclude pattern: [");
        assert_eq!(
            ErrorKind::Io(PathBuf::from("/media")).to_string(),
            "could not read filesystem entry: \"/media\"",
        );
        assert!(ErrorKind::Subprocess(String::new()).is_retryable());
        assert!(!ErrorKind::InvalidOutput.is_retryable());
    }
}
