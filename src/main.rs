use std::{
    fs,
    net::IpAddr,
    path::PathBuf,
    process::ExitCode,
    time::Duration,
};

use backtcp::layer::{Config, ConfigBuilder, Connection, Error};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, Level};

const DEFAULT_PORT: u16 = 6666;
const DEFAULT_MAX_BYTES: usize = 64 * 1024;

#[derive(Debug, Parser)]
#[command(name = "backtcp", version, about = "Reliable file transfer over UDP")]
struct Cli {
    /// debug, info, warning, error or fatal; only the first letter counts
    #[arg(short, long, global = true, default_value = "warning", value_parser = parse_log_level)]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a file to a listening peer
    Send {
        /// Address to send to
        #[arg(short, long, default_value = "127.0.0.1")]
        address: IpAddr,
        #[command(flatten)]
        opts: TransferOpts,
    },
    /// Receive into a file
    Recv {
        /// Address to listen at
        #[arg(short, long, default_value = "0.0.0.0")]
        address: IpAddr,
        /// Stop after this many bytes
        #[arg(long, default_value_t = DEFAULT_MAX_BYTES)]
        max_bytes: usize,
        #[command(flatten)]
        opts: TransferOpts,
    },
}

#[derive(Debug, Args)]
struct TransferOpts {
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Header plus payload, in bytes
    #[arg(long)]
    packet_size: Option<usize>,
    #[arg(long)]
    ack_timeout_ms: Option<u64>,
    #[arg(long)]
    recv_timeout_ms: Option<u64>,
    /// Reassembly window, in packets
    #[arg(long)]
    recv_window: Option<usize>,
    /// Source or destination file
    file: PathBuf,
}

impl TransferOpts {
    fn config(&self) -> Result<Config, Error> {
        let mut builder = ConfigBuilder::default();
        if let Some(x) = self.packet_size {
            builder.max_packet_size = x;
        }
        if let Some(x) = self.ack_timeout_ms {
            builder.ack_timeout = Duration::from_millis(x);
        }
        if let Some(x) = self.recv_timeout_ms {
            builder.recv_idle_timeout = Duration::from_millis(x);
        }
        if let Some(x) = self.recv_window {
            builder.recv_window_packets = x;
        }
        Ok(builder.build()?)
    }
}

fn parse_log_level(s: &str) -> Result<Level, String> {
    match s.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('D') => Ok(Level::DEBUG),
        Some('I') => Ok(Level::INFO),
        Some('W') => Ok(Level::WARN),
        // no level above error in tracing
        Some('E') | Some('F') | Some('C') => Ok(Level::ERROR),
        _ => Err("valid levels are debug, info, warning, error, fatal".to_string()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.as_str())),
        )
        .with_writer(std::io::stderr)
        .init();

    let res = match cli.command {
        Command::Send { address, opts } => send(address, &opts),
        Command::Recv {
            address,
            max_bytes,
            opts,
        } => recv(address, max_bytes, &opts),
    };
    match res {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn send(address: IpAddr, opts: &TransferOpts) -> Result<ExitCode, Error> {
    let data = fs::read(&opts.file)?;
    let mut conn = Connection::open(address, opts.port)?;
    conn.configure(opts.config()?)?;
    let sent = conn.send(&data)?;
    conn.close();
    info!(sent, len = data.len(), "Send finished");
    if sent != data.len() {
        error!("Only {sent} of {} bytes were acknowledged", data.len());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn recv(address: IpAddr, max_bytes: usize, opts: &TransferOpts) -> Result<ExitCode, Error> {
    let mut conn = Connection::listen(address, opts.port)?;
    conn.configure(opts.config()?)?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(max_bytes)?;
    buf.resize(max_bytes, 0);
    let received = conn.receive(&mut buf)?;
    conn.close();
    fs::write(&opts.file, &buf[..received])?;
    info!(received, "Receive finished");
    Ok(ExitCode::SUCCESS)
}
