//! All possible non-I/O protocol errors.
//!
use core::{
    error,
    fmt::{Display, Formatter},
};
use std::io::{self, ErrorKind};

/// Enumeration of all possible non-I/O protocol errors.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum Error {
    /// The gateway's frame stream can no longer be parsed.
    ///
    /// The protocol defines no error-recovery or resynchronization
    /// mechanism, so once a header or body fails to parse there is no way
    /// to find the start of the next frame.
    ///
    /// # Suggested error handling strategy
    ///
    /// This error is fatal. The connection should be closed and the
    /// reconnect policy of the owning supervisor applied. Frames buffered
    /// at the time of failure are discarded; the gateway will not replay
    /// them.
    Frame(FrameError),

    /// The calling layer misused the outbound packet builder.
    ///
    /// This is a programming error in the layer driving the client, not a
    /// network condition. Nothing is transmitted when it occurs.
    Contract(ContractViolation),
}

/// All fatal framing and codec errors.
///
/// Any of these means the byte stream is corrupted from this point on.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum FrameError {
    /// The 16-byte length field contained something other than ASCII
    /// decimal digits.
    LengthNotDecimal {
        /// Lossy rendering of the length field we received.
        received: String,
    },

    /// The declared total frame length is smaller than the fixed header,
    /// which would give the body a negative length.
    LengthUnderflow {
        /// The declared total frame length.
        declared: usize,
    },

    /// The declared body length exceeds the sanity cap.
    BodyTooLarge {
        /// The declared body length.
        declared: usize,
    },

    /// The frame body is not well-formed XML.
    MalformedXml {
        /// Parser detail, for logging only.
        detail: String,
    },

    /// The frame body parsed as XML but does not have the flat
    /// root-plus-field-children shape the protocol requires.
    UnexpectedXml {
        /// A hint about where the structure deviated.
        detail: String,
    },

    /// A previous fatal error already poisoned this connection; no further
    /// input will be processed.
    StreamCorrupted,
}

/// The outbound packet builder was driven with invalid parameters.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum ContractViolation {
    /// A required outbound field was empty or missing.
    EmptyField {
        /// The wire name of the offending field.
        field: &'static str,
    },

    /// A data response was requested before the login handshake completed.
    ResponseBeforeLogin,
}

/// The reason a structurally decodable inbound packet was rejected.
///
/// Rejections are not fatal: the connection stays open and subsequent
/// frames are processed. The validator returns the reason and leaves the
/// log-and-drop decision to the caller; the protocol has no NACK channel,
/// so the peer is never told.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum RejectReason {
    /// The root tag names no packet type this client knows.
    UnknownPacketType {
        /// The tag we received.
        tag: String,
    },

    /// The packet carried fields outside the type's declared schema.
    UnexpectedFields {
        /// The packet type whose schema was violated.
        tag: &'static str,
        /// The offending field names.
        fields: Vec<String>,
    },

    /// The packet is missing fields its type declares as mandatory.
    MissingFields {
        /// The packet type whose schema was violated.
        tag: &'static str,
        /// The absent field names.
        fields: Vec<String>,
    },

    /// A data request arrived before the login handshake completed.
    NotAuthenticated,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Frame(err) => write!(f, "Frame: {}", err),
            Error::Contract(err) => write!(f, "Contract: {}", err),
        }
    }
}

impl Display for FrameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            FrameError::LengthNotDecimal { received } => {
                write!(f, "LengthNotDecimal: received {:?}", received)
            }
            FrameError::LengthUnderflow { declared } => {
                write!(f, "LengthUnderflow: declared total {}", declared)
            }
            FrameError::BodyTooLarge { declared } => {
                write!(f, "BodyTooLarge: declared body {}", declared)
            }
            FrameError::MalformedXml { detail } => write!(f, "MalformedXml: {}", detail),
            FrameError::UnexpectedXml { detail } => write!(f, "UnexpectedXml: {}", detail),
            FrameError::StreamCorrupted => write!(f, "StreamCorrupted"),
        }
    }
}

impl Display for ContractViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            ContractViolation::EmptyField { field } => {
                write!(f, "EmptyField: {}", field)
            }
            ContractViolation::ResponseBeforeLogin => write!(f, "ResponseBeforeLogin"),
        }
    }
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            RejectReason::UnknownPacketType { tag } => {
                write!(f, "UnknownPacketType: {}", tag)
            }
            RejectReason::UnexpectedFields { tag, fields } => {
                write!(f, "UnexpectedFields in {}: {:?}", tag, fields)
            }
            RejectReason::MissingFields { tag, fields } => {
                write!(f, "MissingFields in {}: {:?}", tag, fields)
            }
            RejectReason::NotAuthenticated => write!(f, "NotAuthenticated"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Frame(err) => Some(err),
            Error::Contract(err) => Some(err),
        }
    }
}

impl error::Error for FrameError {}

impl error::Error for ContractViolation {}

impl error::Error for RejectReason {}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        io::Error::new(ErrorKind::Other, e)
    }
}

impl From<FrameError> for io::Error {
    fn from(e: FrameError) -> Self {
        io::Error::new(ErrorKind::Other, Error::Frame(e))
    }
}

impl From<ContractViolation> for io::Error {
    fn from(e: ContractViolation) -> Self {
        io::Error::new(ErrorKind::Other, Error::Contract(e))
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Error::Frame(e)
    }
}

impl From<ContractViolation> for Error {
    fn from(e: ContractViolation) -> Self {
        Error::Contract(e)
    }
}
