/// Errors from strict payload decoding.
///
/// The permissive `decode` entry points never return these; they fold a
/// failure into [`Decoded::Unknown`](crate::Decoded::Unknown).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// An item would read past the end of the payload.
    #[error("{what} truncated at offset {offset}")]
    Truncated { what: &'static str, offset: usize },

    /// A data type code outside the known set.
    #[error("unknown data type code {0}")]
    UnknownDataType(u8),

    /// The payload parsed but carried nothing usable.
    #[error("no {what} records in payload")]
    NoRecords { what: &'static str },

    /// A text field that does not parse.
    #[error("invalid {what}: {value:?}")]
    InvalidField { what: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, PayloadError>;
