//! Socket setup and reconnect backoff

use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use crate::config::ReconnectConfig;
use crate::error::{LyngdorfError, Result};
use crate::protocol::LineCodec;

pub type LineReader = FramedRead<OwnedReadHalf, LineCodec>;
pub type LineWriter = FramedWrite<OwnedWriteHalf, LineCodec>;

/// Both framed halves of one open socket
pub struct Link {
    pub reader: LineReader,
    pub writer: LineWriter,
}

/// Connect to `host:port` within `connect_timeout`.
pub async fn open(host: &str, port: u16, connect_timeout: Duration) -> Result<Link> {
    let addr = format!("{}:{}", host, port);
    debug!("Connecting to {}", addr);

    let stream = timeout(connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| LyngdorfError::ConnectionError {
            host: host.to_string(),
            port,
            reason: format!("timed out after {:?}", connect_timeout),
        })?
        .map_err(|e| LyngdorfError::ConnectionError {
            host: host.to_string(),
            port,
            reason: e.to_string(),
        })?;

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY on {}: {}", addr, e);
    }

    let (read_half, write_half) = stream.into_split();
    Ok(Link {
        reader: FramedRead::new(read_half, LineCodec::new()),
        writer: FramedWrite::new(write_half, LineCodec::new()),
    })
}

/// Exponential backoff capped at a maximum delay
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            attempts: 0,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(config.initial_delay(), config.max_delay())
    }

    /// Delay before the next attempt. Counts the attempt and doubles the
    /// following delay up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.attempts = self.attempts.saturating_add(1);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    /// Attempts made since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
