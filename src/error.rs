use thiserror::Error;

/// Our error type
#[derive(Debug, Error)]
pub enum Error {
    /// Fewer bytes are available than a field declares
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput {
        /// Bytes the field needs
        needed: usize,
        /// Bytes actually left
        remaining: usize,
    },
    /// A declared or derived length does not reconcile with its envelope
    #[error("inconsistent length: {0}")]
    InconsistentLength(String),
    /// A length-bounded section ends part way through an element
    #[error("malformed sequence: {0} ends mid-element")]
    MalformedSequence(&'static str),
    /// An OPEN optional parameter whose capabilities don't fill its length
    #[error("malformed option: {0}")]
    MalformedOption(String),
    /// A prefix longer than its address family allows
    #[error("malformed prefix: bit length {bit_length} exceeds {max}")]
    MalformedPrefix {
        /// Declared prefix length
        bit_length: u8,
        /// Maximum for the address family
        max: u8,
    },
    /// BMP record type outside 0..=5
    #[error("unknown BMP record type {0}")]
    UnknownRecordType(u8),
    /// Address family discriminant outside {0, 1}
    #[error("unknown address family {0}")]
    UnknownAddressFamily(u8),
    /// Bytes that can't form an address of the declared family
    #[error("invalid {family} address of {len} bytes")]
    InvalidAddress {
        /// "IPv4" or "IPv6"
        family: &'static str,
        /// Number of bytes offered
        len: usize,
    },
    /// Statistics counter whose size is neither 4 nor 8
    #[error("invalid statistics value size {0}")]
    InvalidStatsSize(u16),
    /// Embedded BGP message of the wrong type
    #[error("unexpected BGP message type {found}, expected {expected}")]
    UnexpectedMessageType {
        /// Type the enclosing message requires
        expected: u8,
        /// Type found on the wire
        found: u8,
    },
    /// A stream refused to buffer a record this large
    #[error("record length {length} exceeds limit of {max}")]
    RecordTooLarge {
        /// Declared record length
        length: usize,
        /// Configured limit
        max: usize,
    },
    /// std::io::Error
    #[error("IO error: {0}")]
    WireError(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn truncated(needed: usize, remaining: usize) -> Self {
        Self::TruncatedInput { needed, remaining }
    }

    /// True when the error came from running out of bytes
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::TruncatedInput { .. })
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> std::io::Error {
        match err {
            Error::WireError(e) => e,
            e @ Error::TruncatedInput { .. } => Self::new(
                std::io::ErrorKind::UnexpectedEof,
                e.to_string(),
            ),
            e => Self::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            ),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
