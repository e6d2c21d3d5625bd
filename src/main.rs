//! Orchestration shim: CLI parsing, local file handling, and exit-code
//! mapping around the protocol engine.
//!
//! ```text
//! tftp-client [-v] [-h HOST] [-p PORT] [--config FILE] -r REMOTE [LOCAL]
//! tftp-client [-v] [-h HOST] [-p PORT] [--config FILE] -w [LOCAL] REMOTE
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tftp_client::config::{EngineConfig, load_config};
use tftp_client::error::TftpError;
use tftp_client::session::{Direction, Session, TransferMode};
use tftp_client::{engine, socket};

#[derive(Parser, Debug)]
#[command(name = "tftp-client", version, about = "A TFTP (RFC 1350) client")]
#[command(group(ArgGroup::new("direction").args(["read", "write"]).required(true)))]
struct Cli {
    /// Select RRQ (read from server).
    #[arg(short = 'r')]
    read: bool,

    /// Select WRQ (write to server).
    #[arg(short = 'w')]
    write: bool,

    /// Remote server host.
    #[arg(short = 'h', default_value = "localhost")]
    host: String,

    /// Remote server port.
    #[arg(short = 'p', default_value_t = 69)]
    port: u16,

    /// Enable verbose logging to the error stream.
    #[arg(short = 'v')]
    verbose: bool,

    /// Optional TOML file overriding retry/backoff defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// For -r: REMOTE [LOCAL]. For -w: LOCAL [REMOTE].
    #[arg(num_args = 1..=2)]
    files: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .without_time()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tftp-client: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> tftp_client::Result<()> {
    let direction = if cli.read { Direction::Read } else { Direction::Write };

    let (remote_file, local_file) = match direction {
        Direction::Read => {
            let remote = cli.files.first().cloned().ok_or_else(missing_filename)?;
            let local = cli.files.get(1).cloned().unwrap_or_else(|| remote.clone());
            (remote, local)
        }
        Direction::Write => {
            let local = cli.files.first().cloned().ok_or_else(missing_filename)?;
            let remote = cli.files.get(1).cloned().unwrap_or_else(|| local.clone());
            (remote, local)
        }
    };

    let engine_config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    let (sock, peer_addr) = socket::bind_socket(&cli.host, cli.port)?;

    let local_fd = match direction {
        Direction::Read => tokio::fs::File::create(&local_file).await.map_err(TftpError::LocalIo)?,
        Direction::Write => tokio::fs::File::open(&local_file).await.map_err(TftpError::LocalIo)?,
    };

    let mode = TransferMode::Octet;
    let mut session = Session::new(
        cli.host.clone(),
        cli.port,
        mode,
        remote_file.clone(),
        local_file.clone(),
        direction,
        peer_addr,
        sock,
        local_fd,
        engine_config.retries,
        engine_config.initial_backoff(),
    );

    let opcode = match direction {
        Direction::Read => tftp_client::wire::OPCODE_RRQ,
        Direction::Write => tftp_client::wire::OPCODE_WRQ,
    };
    let len = tftp_client::wire::encode_request(&mut session.out_buf, opcode, &remote_file, mode.as_str())?;
    session.out_len = len;
    session.state = match direction {
        Direction::Read => tftp_client::session::SessionState::RrqSent,
        Direction::Write => tftp_client::session::SessionState::WrqSent,
    };

    info!(
        "{} {} {}:{} (local file {})",
        if cli.read { "reading" } else { "writing" },
        remote_file,
        cli.host,
        cli.port,
        local_file
    );

    engine::run(&mut session).await?;

    info!("transfer complete");
    Ok(())
}

fn missing_filename() -> TftpError {
    TftpError::Other(anyhow::anyhow!(
        "usage: tftp-client [-v] [-h host] [-p port] -r <file> [localname]\n       tftp-client [-v] [-h host] [-p port] -w [localname] <file>"
    ))
}
