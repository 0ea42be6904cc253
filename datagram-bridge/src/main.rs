//! Diagnostic harness for `datagram-bridge`.
//!
//! Not part of the library: binds or connects a [`ConnectionManager`] and
//! prints whatever arrives, optionally sending a message every interval, or
//! plays a stand-in peer that answers state frames.  `main.rs` owns only
//! process setup (logging, argument parsing).

use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use datagram_bridge::frame::{decode_state, encode_f32s, STATE_DIM};
use datagram_bridge::socket::Transport;
use datagram_bridge::{ConnectionConfig, ConnectionManager, Datagram};

/// Push/pull datagrams the way a control loop would.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Datagrams kept between drains.
    #[arg(long, default_value_t = 2, global = true)]
    capacity: usize,

    /// Socket receive timeout in milliseconds.
    #[arg(long, default_value_t = 500, global = true)]
    timeout_ms: u64,
}

#[derive(Subcommand)]
enum Mode {
    /// Bind and print drained datagrams periodically.
    Listen {
        #[arg(short, long, default_value = "0.0.0.0:55001")]
        bind: String,
        #[arg(short, long, default_value_t = 1000)]
        interval_ms: u64,
        /// Stop after this many intervals (runs forever when omitted).
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Connect to a peer, send a message periodically, print replies.
    Send {
        #[arg(short, long)]
        peer: String,
        #[arg(short, long, default_value = "Hello ESP")]
        message: String,
        #[arg(short, long, default_value_t = 1000)]
        interval_ms: u64,
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Answer every 24-byte state frame with a 12-float observation.
    Echo {
        #[arg(short, long, default_value = "127.0.0.1:55001")]
        bind: String,
    },
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .with_context(|| format!("expected HOST:PORT, got {addr:?}"))?;
    let port = port
        .parse()
        .with_context(|| format!("invalid port in {addr:?}"))?;
    Ok((host.trim_matches(&['[', ']'][..]).to_string(), port))
}

fn print_batch(batch: &[Datagram]) {
    for dg in batch {
        println!(
            "#{} from {}: {:?}",
            dg.seq,
            dg.sender,
            String::from_utf8_lossy(&dg.payload)
        );
    }
}

/// Drain every `interval`, optionally sending `message` after each drain.
fn pump(
    conn: &ConnectionManager,
    interval: Duration,
    ticks: Option<u64>,
    message: Option<&[u8]>,
) -> Result<()> {
    let mut tick = 0u64;
    while ticks.map_or(true, |n| tick < n) {
        thread::sleep(interval);
        print_batch(&conn.get_data());
        if !conn.healthy() {
            bail!("receiver is {}", conn.receiver_state());
        }
        if let Some(message) = message {
            if let Err(e) = conn.send(message, None) {
                log::warn!("{e}");
            }
        }
        tick += 1;
    }
    Ok(())
}

fn echo(bind: &str, timeout: Duration) -> Result<()> {
    let (host, port) = split_host_port(bind)?;
    let mut transport = Transport::default();
    let local = transport.bind(&host, port)?;
    log::info!("echo peer on {local}");

    let mut previous = [0f32; STATE_DIM];
    loop {
        let Some(dg) = transport.receive_one(timeout)? else {
            continue;
        };
        let state = match decode_state(&dg.payload) {
            Ok(state) => state,
            Err(e) => {
                log::warn!("ignoring datagram from {}: {e}", dg.sender);
                continue;
            }
        };
        // Observation: the state followed by its change since the last frame.
        let mut obs = Vec::with_capacity(STATE_DIM * 2);
        obs.extend_from_slice(&state);
        obs.extend(state.iter().zip(&previous).map(|(s, p)| s - p));
        previous = state;
        transport.send(&encode_f32s(&obs), Some(dg.sender))?;
    }
}

fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = ConnectionConfig {
        buffer_capacity: cli.capacity,
        socket_timeout: Duration::from_millis(cli.timeout_ms),
        ..Default::default()
    };
    config.validate()?;

    match cli.mode {
        Mode::Listen {
            bind,
            interval_ms,
            ticks,
        } => {
            let (host, port) = split_host_port(&bind)?;
            let mut conn = ConnectionManager::new(config)?;
            let local = conn.bind(&host, port)?;
            conn.listen()?;
            log::info!("listening on {local}");
            pump(&conn, Duration::from_millis(interval_ms), ticks, None)?;
            conn.close()?;
        }
        Mode::Send {
            peer,
            message,
            interval_ms,
            ticks,
        } => {
            let (host, port) = split_host_port(&peer)?;
            let mut conn = ConnectionManager::new(config)?;
            conn.connect(&host, port)?;
            conn.listen()?;
            log::info!("sending to {peer}");
            pump(
                &conn,
                Duration::from_millis(interval_ms),
                ticks,
                Some(message.as_bytes()),
            )?;
            conn.close()?;
        }
        Mode::Echo { bind } => echo(&bind, config.socket_timeout)?,
    }
    Ok(())
}
