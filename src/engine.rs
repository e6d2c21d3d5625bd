//! The state machine and event loop that drive a [`Session`] from its
//! initial state to `Closed`.
//!
//! Exactly two suspension points per iteration: the readiness wait (bounded
//! by the current backoff) and the receive call once the socket is ready.
//! One `tokio` task, no spawned work, no shared state beyond the session:
//! a single async task stands in for a blocking `select()` mainloop
//! without changing that single-threaded shape.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::error::{Result, TftpError};
use crate::session::{Session, SessionState};
use crate::wire::{self, BLOCK_SIZE, MAX_MSG_SIZE};

/// Drive `session` to completion. Requires `session.out_buf` already holds
/// the encoded RRQ/WRQ and `session.state` is `RrqSent` or `WrqSent`.
pub async fn run(session: &mut Session) -> Result<()> {
    let mut recv_buf = [0u8; MAX_MSG_SIZE];

    loop {
        if session.state == SessionState::Closed {
            return Ok(());
        }

        send_phase(session).await?;
        if session.state == SessionState::Closed {
            return Ok(());
        }

        match receive_phase(session, &mut recv_buf).await? {
            Some((len, from)) => {
                if session.peer_locked && from != session.peer_addr {
                    warn!("dropping datagram from unexpected source {from}");
                    continue;
                }
                let buf = &recv_buf[..len];
                // Only a datagram that at least decodes as a TFTP packet
                // counts as a "valid reply" for TID-locking purposes;
                // garbage arriving before the real server's answer must
                // not permanently lock the session onto the wrong peer.
                if wire::decode_opcode(buf).is_err() {
                    debug!("dropping malformed datagram ({len} bytes) before peer lock");
                    continue;
                }
                if !session.peer_locked {
                    session.peer_locked = true;
                    session.peer_addr = from;
                    debug!("locked peer address to {from}");
                }
                dispatch(session, buf).await?;
            }
            None => continue, // timeout on this iteration, retry budget already decremented
        }
    }
}

/// Phase 1: (re)transmit `out_buf` if the deadline is unset or has
/// elapsed. Immediately after sending the final ACK, close the session —
/// the protocol does not ask the server to acknowledge it.
async fn send_phase(session: &mut Session) -> Result<()> {
    let now = Instant::now();
    let due = match session.deadline {
        None => true,
        Some(deadline) => now > deadline,
    };
    if due {
        session
            .sock
            .send_to(session.out_bytes(), session.peer_addr)
            .await
            .map_err(TftpError::LocalIo)?;
        debug!(
            "sent {} bytes to {} (state {:?}, blkno {})",
            session.out_len, session.peer_addr, session.state, session.blkno
        );
    }

    if session.state == SessionState::LastAckSent {
        session.state = SessionState::Closed;
    }
    Ok(())
}

/// Phase 2: compute how long to wait (fresh send → start timer, retransmit
/// → double backoff, neither → wait the remainder) and wait for a datagram.
///
/// Returns `Ok(Some((len, from)))` on a received datagram, `Ok(None)` if
/// the wait expired and a retry remains (the caller's loop will
/// retransmit on the next iteration), or `Err(Timeout)` once the retry
/// budget is exhausted.
async fn receive_phase(
    session: &mut Session,
    recv_buf: &mut [u8; MAX_MSG_SIZE],
) -> Result<Option<(usize, std::net::SocketAddr)>> {
    let now = Instant::now();
    let wait = match session.deadline {
        None => {
            session.deadline = Some(now + session.backoff);
            session.backoff
        }
        Some(deadline) if now > deadline => {
            session.backoff *= 2;
            session.deadline = Some(now + session.backoff);
            session.backoff
        }
        Some(deadline) => deadline - now,
    };

    match timeout(wait, session.sock.recv_from(recv_buf)).await {
        Ok(Ok((len, from))) => Ok(Some((len, from))),
        Ok(Err(e)) => Err(TftpError::LocalIo(e)),
        Err(_elapsed) => {
            session.retries_left -= 1;
            if session.retries_left == 0 {
                return Err(TftpError::Timeout);
            }
            Ok(None)
        }
    }
}

/// Phase 3: decode the opcode and drive the state × opcode transition
/// table. Malformed datagrams are dropped without consuming the retry
/// budget.
async fn dispatch(session: &mut Session, buf: &[u8]) -> Result<()> {
    let opcode = match wire::decode_opcode(buf) {
        Ok(opcode) => opcode,
        Err(_) => {
            debug!("dropping malformed datagram ({} bytes)", buf.len());
            return Ok(());
        }
    };

    match session.state {
        SessionState::WrqSent | SessionState::DataSent | SessionState::LastDataSent => {
            match opcode {
                wire::OPCODE_ACK => handle_ack(session, buf).await,
                wire::OPCODE_ERROR => handle_error(session, buf),
                _ => {
                    warn!("unexpected message ignored (opcode {opcode})");
                    Ok(())
                }
            }
        }
        SessionState::RrqSent | SessionState::AckSent => match opcode {
            wire::OPCODE_DATA => handle_data(session, buf).await,
            wire::OPCODE_ERROR => handle_error(session, buf),
            _ => {
                warn!("unexpected message ignored (opcode {opcode})");
                Ok(())
            }
        },
        SessionState::Closed => Ok(()),
    }
}

async fn handle_ack(session: &mut Session, buf: &[u8]) -> Result<()> {
    let blkno = match wire::decode_blkno(buf) {
        Ok(blkno) => blkno,
        Err(_) => {
            debug!("dropping malformed ACK");
            return Ok(());
        }
    };
    if blkno != session.blkno {
        debug!("ignoring ACK for unexpected block {blkno} (expected {})", session.blkno);
        return Ok(());
    }

    if session.state == SessionState::LastDataSent {
        session.state = SessionState::Closed;
        return Ok(());
    }

    let mut chunk = [0u8; BLOCK_SIZE];
    let n = session
        .local_fd
        .read(&mut chunk)
        .await
        .map_err(TftpError::LocalIo)?;

    session.blkno = session.blkno.wrapping_add(1);
    let len = wire::encode_data(&mut session.out_buf, session.blkno, &chunk[..n])?;
    session.out_len = len;
    session.reset_progress();
    session.state = if n == BLOCK_SIZE {
        SessionState::DataSent
    } else {
        SessionState::LastDataSent
    };
    Ok(())
}

async fn handle_data(session: &mut Session, buf: &[u8]) -> Result<()> {
    let blkno = match wire::decode_blkno(buf) {
        Ok(blkno) => blkno,
        Err(_) => {
            debug!("dropping malformed DATA");
            return Ok(());
        }
    };
    if blkno != session.blkno {
        debug!(
            "ignoring stale DATA for block {blkno} (expected {})",
            session.blkno
        );
        return Ok(());
    }
    let payload = match wire::decode_data(buf) {
        Ok(payload) => payload,
        Err(_) => {
            debug!("dropping short DATA packet");
            return Ok(());
        }
    };

    session
        .local_fd
        .write_all(payload)
        .await
        .map_err(TftpError::LocalIo)?;

    let is_final = payload.len() < BLOCK_SIZE;
    let len = wire::encode_ack(&mut session.out_buf, session.blkno)?;
    session.out_len = len;
    session.blkno = session.blkno.wrapping_add(1);
    session.reset_progress();
    session.state = if is_final {
        SessionState::LastAckSent
    } else {
        SessionState::AckSent
    };
    Ok(())
}

fn handle_error(session: &mut Session, buf: &[u8]) -> Result<()> {
    let (code, message) = match wire::decode_error(buf) {
        Ok(parsed) => parsed,
        Err(_) => {
            debug!("dropping malformed ERROR packet");
            return Ok(());
        }
    };
    session.state = SessionState::Closed;
    Err(TftpError::PeerError {
        code,
        message: String::from_utf8_lossy(message).into_owned(),
    })
}
