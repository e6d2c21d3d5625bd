use thiserror::Error;

/// Error kinds visible at the protocol-engine boundary.
///
/// `Malformed` is the only non-fatal kind: the engine drops the offending
/// datagram and keeps the retry budget intact. Every other variant ends the
/// session.
#[derive(Error, Debug)]
pub enum TftpError {
    #[error("encoded packet exceeds the 516-byte envelope")]
    EncodingTooLarge,

    #[error("could not reach {host}:{port}: no usable address candidate")]
    Unreachable { host: String, port: u16 },

    #[error("timeout, aborting data transfer")]
    Timeout,

    #[error("tftp error {code}: {message}")]
    PeerError { code: u16, message: String },

    #[error("{0}")]
    LocalIo(#[from] std::io::Error),

    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TftpError>;
