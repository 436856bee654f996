use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Decode-time structural violation in the postings of `term`.
    ///
    /// `offset` is the byte offset inside the term postings where the violation
    /// was detected, `doc_id` is the document being decoded, if already known.
    pub fn corrupt_postings(
        term: impl Into<String>,
        doc_id: Option<u32>,
        offset: usize,
        message: impl Into<String>,
    ) -> Error {
        Error(
            ErrorKind::CorruptPostings {
                term: term.into(),
                doc_id,
                offset,
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invariant_violation(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvariantViolation {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn unsupported_configuration(
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Error {
        Error(
            ErrorKind::UnsupportedConfiguration {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Error {
        Error(
            ErrorKind::Json {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    /// Attaches the term name and document id to a `CorruptPostings` error raised
    /// by a component that did not know them. Fields that are already set are
    /// kept, other error kinds pass through unchanged.
    pub fn with_postings_context(self, name: &str, doc: Option<u32>) -> Error {
        match *self.0 {
            ErrorKind::CorruptPostings {
                term,
                doc_id,
                offset,
                message,
            } => {
                let term = if term.is_empty() { name.to_string() } else { term };
                Error::corrupt_postings(term, doc_id.or(doc), offset, message)
            }
            kind => Error(Box::new(kind)),
        }
    }

    /// Returns `true` for errors raised while decoding stored postings.
    pub fn is_corrupt_postings(&self) -> bool {
        matches!(self.kind(), ErrorKind::CorruptPostings { .. })
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvariantViolation { .. })
    }

    pub fn is_unsupported_configuration(&self) -> bool {
        matches!(self.kind(), ErrorKind::UnsupportedConfiguration { .. })
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidArgument { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error(
        "corrupt postings for term '{term}' (doc: {}, offset: {offset}): {message}",
        doc_id.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()))]
    CorruptPostings {
        term: String,
        doc_id: Option<u32>,
        offset: usize,
        message: String,
    },

    #[error("invariant violation: {message}")]
    InvariantViolation { message: String },

    #[error("unsupported configuration {name}: {message}")]
    UnsupportedConfiguration { name: String, message: String },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("JSON error for '{context}': {source}")]
    Json {
        context: String,
        source: serde_json::Error,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::json("", e)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(value: std::convert::Infallible) -> Self {
        match value {}
    }
}
