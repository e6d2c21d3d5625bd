//! In-memory record of one RRQ or WRQ transfer.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::fs::File;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::error::{Result, TftpError};
use crate::wire::MAX_MSG_SIZE;

/// Transfer mode (RFC 1350). Only `Octet` is transformed by anything in
/// this crate; `Netascii` and `Mail` are accepted and sent verbatim — the
/// client performs no newline translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Netascii,
    Octet,
    Mail,
}

impl TransferMode {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "netascii" => Ok(TransferMode::Netascii),
            "octet" => Ok(TransferMode::Octet),
            "mail" => Ok(TransferMode::Mail),
            other => Err(TftpError::Other(anyhow::anyhow!("unknown transfer mode: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMode::Netascii => "netascii",
            TransferMode::Octet => "octet",
            TransferMode::Mail => "mail",
        }
    }
}

/// Direction of the transfer, i.e. which request opcode starts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// The six states of the TFTP client state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    RrqSent,
    WrqSent,
    DataSent,
    LastDataSent,
    AckSent,
    LastAckSent,
}

/// Retry budget reset whenever `state` or `blkno` makes forward progress.
pub const DEFAULT_RETRIES: u32 = 6;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);

/// One TFTP transfer: remote address, current block number, current state,
/// last-sent packet bytes, deadline timer, backoff interval, and the open
/// local file.
pub struct Session {
    pub host: String,
    pub port: u16,
    pub mode: TransferMode,
    pub remote_file: String,
    pub local_file: String,

    pub peer_addr: SocketAddr,
    /// Locked once the first valid reply arrives (strict TID
    /// enforcement).
    pub peer_locked: bool,

    pub sock: UdpSocket,
    pub local_fd: File,

    pub state: SessionState,
    pub blkno: u16,

    pub out_buf: [u8; MAX_MSG_SIZE],
    pub out_len: usize,

    pub deadline: Option<Instant>,
    pub backoff: Duration,
    pub retries_left: u32,

    /// Defaults restored by `reset_progress` — normally [`DEFAULT_RETRIES`]
    /// and [`DEFAULT_BACKOFF`], but overridable via [`crate::config::EngineConfig`].
    default_retries: u32,
    default_backoff: Duration,
}

impl Session {
    /// Build a session for `direction`, already bound to `peer_addr` and
    /// holding `local_fd` open for the transfer's I/O direction. `blkno`
    /// starts at 1 for RRQ (next expected DATA block) and 0 for WRQ (just
    /// sent WRQ, awaiting ACK 0) on entry.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: String,
        port: u16,
        mode: TransferMode,
        remote_file: String,
        local_file: String,
        direction: Direction,
        peer_addr: SocketAddr,
        sock: UdpSocket,
        local_fd: File,
        default_retries: u32,
        default_backoff: Duration,
    ) -> Self {
        Self {
            host,
            port,
            mode,
            remote_file,
            local_file,
            peer_addr,
            peer_locked: false,
            sock,
            local_fd,
            state: SessionState::Closed,
            blkno: if direction == Direction::Read { 1 } else { 0 },
            out_buf: [0u8; MAX_MSG_SIZE],
            out_len: 0,
            deadline: None,
            backoff: default_backoff,
            retries_left: default_retries,
            default_retries,
            default_backoff,
        }
    }

    /// Reset the retry budget and backoff interval on forward progress
    /// ("Duplicate datagrams therefore do not reset the
    /// retry budget").
    pub fn reset_progress(&mut self) {
        self.deadline = None;
        self.backoff = self.default_backoff;
        self.retries_left = self.default_retries;
    }

    pub fn out_bytes(&self) -> &[u8] {
        &self.out_buf[..self.out_len]
    }
}
