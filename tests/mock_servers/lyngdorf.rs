#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Mock Lyngdorf processor for testing
//!
//! Speaks the `!CMD\r` control protocol: echoes every command as `#CMD`,
//! answers queries from a response table and turns set commands into status
//! notifications.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};

/// Out-of-band instructions for open connections
#[derive(Debug, Clone)]
enum Control {
    /// Send an unsolicited line
    Push(String),
    /// Drop the connection
    Close,
}

/// Mock processor state
#[derive(Debug, Clone, Default)]
pub struct MockLyngdorfState {
    /// Query text (`VOL?`) to reply lines
    pub responses: HashMap<String, Vec<String>>,
    /// Commands that get neither echo nor reply
    pub silenced: HashSet<String>,
    /// Every command received, without the `!`
    pub received: Vec<String>,
}

fn table(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(query, lines)| {
            (
                query.to_string(),
                lines.iter().map(|l| l.to_string()).collect(),
            )
        })
        .collect()
}

impl MockLyngdorfState {
    /// An MP-60 with three sources, two voicings, two focus positions and two audio modes
    pub fn mp60() -> Self {
        Self {
            responses: table(&[
                ("VERB?", &["!VERB(2)"]),
                ("DEVICE?", &["!DEVICE\"MP-60\""]),
                ("POWER?", &["!POWER(ON)"]),
                ("MAXVOL?", &["!MAXVOL(120)"]),
                ("VOL?", &["!VOL(-405)"]),
                ("MUTE?", &["!MUTEOFF"]),
                (
                    "SRCS?",
                    &[
                        "!SRCCOUNT(3)",
                        "!SRC(1,\"TV\")",
                        "!SRC(2,\"Roon\")",
                        "!SRC(3,\"Blu-ray\")",
                    ],
                ),
                ("SRC?", &["!SRC(2)"]),
                ("STREAMTYPE?", &["!STREAMTYPE(3)"]),
                (
                    "RPVOIS?",
                    &["!RPVOICOUNT(2)", "!RPVOI(1,\"Neutral\")", "!RPVOI(2,\"Music\")"],
                ),
                ("RPVOI?", &["!RPVOI(1)"]),
                (
                    "RPFOCS?",
                    &["!RPFOCCOUNT(2)", "!RPFOC(1,\"Sofa\")", "!RPFOC(2,\"Desk\")"],
                ),
                ("RPFOC?", &["!RPFOC(1)"]),
                (
                    "AUDMODEL?",
                    &[
                        "!AUDMODECOUNT(2)",
                        "!AUDMODE(1,\"Auto\")",
                        "!AUDMODE(2,\"Dolby Upmix\")",
                    ],
                ),
                ("AUDMODE?", &["!AUDMODE(1)"]),
                ("AUDIN?", &["!AUDIN(1)"]),
                ("AUDTYPE?", &["!AUDTYPE(PCM, 2.0, 48kHz)"]),
                ("VIDIN?", &["!VIDIN(1)"]),
                ("VIDTYPE?", &["!VIDTYPE\"1080p\""]),
                ("HDMIMAINOUT?", &["!HDMIMAINOUT(1)"]),
                ("LIPSYNCRANGE?", &["!LIPSYNCRANGE(0,200)"]),
                ("LIPSYNC?", &["!LIPSYNC(40)"]),
                ("DTSDIALOGAVAILABLE?", &["!DTSDIALOGAVAILABLE(OFF)"]),
                ("DTSDIALOG?", &["!DTSDIALOG(0)"]),
                ("LOUDNESS?", &["!LOUDNESS(ON)"]),
                ("TRIMBASS?", &["!TRIMBASS(-15)"]),
                ("TRIMTREB?", &["!TRIMTREB(10)"]),
                ("TRIMCENTER?", &["!TRIMCENTER(0)"]),
                ("TRIMHEIGHT?", &["!TRIMHEIGHT(0)"]),
                ("TRIMLFE?", &["!TRIMLFE(-20)"]),
                ("TRIMSURRS?", &["!TRIMSURRS(5)"]),
            ]),
            ..Default::default()
        }
    }

    /// A TDAI-3400 with two sources
    pub fn tdai3400() -> Self {
        Self {
            responses: table(&[
                ("VERB?", &["!VERB(2)"]),
                ("DEVICE?", &["!DEVICE\"TDAI-3400\""]),
                ("PWR?", &["!PWR(1)"]),
                ("VOL?", &["!VOL(-300)"]),
                ("MUTE?", &["!MUTEOFF"]),
                (
                    "SRCLIST?",
                    &["!SRCCOUNT(2)", "!SRC(1,\"Optical\")", "!SRC(2,\"Streamer\")"],
                ),
                ("SRCNAME?", &["!SRC(1)"]),
                ("STREAMTYPE?", &["!STREAMTYPE(0)"]),
                ("AUDIOSTATUS?", &["!AUDIOSTATUS(PCM, 44.1kHz)"]),
                ("VOILIST?", &["!VOICOUNT(1)", "!VOI(1,\"Neutral\")"]),
                ("VOINAME?", &["!VOI(1)"]),
                ("RPLIST?", &["!RPCOUNT(1)", "!RP(1,\"Chair\")"]),
                ("RPNAME?", &["!RP(1)"]),
            ]),
            ..Default::default()
        }
    }
}

/// Mock Lyngdorf server
pub struct MockLyngdorf {
    addr: SocketAddr,
    state: Arc<RwLock<MockLyngdorfState>>,
    control: broadcast::Sender<Control>,
    connections: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockLyngdorf {
    /// Start a mock MP-60 on a random port
    pub async fn start() -> Self {
        Self::start_with(MockLyngdorfState::mp60()).await
    }

    pub async fn start_with(initial: MockLyngdorfState) -> Self {
        let state = Arc::new(RwLock::new(initial));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (control, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));

        let state_clone = state.clone();
        let control_clone = control.clone();
        let connections_clone = connections.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        connections_clone.fetch_add(1, Ordering::SeqCst);
                        let state = state_clone.clone();
                        let control = control_clone.subscribe();
                        tokio::spawn(async move {
                            handle_connection(stream, state, control).await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            addr,
            state,
            control,
            connections,
            handle,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Replace the reply lines for a query
    pub async fn set_response(&self, query: &str, lines: &[&str]) {
        self.state.write().await.responses.insert(
            query.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
    }

    /// Stop answering (and echoing) a command
    pub async fn silence(&self, command: &str) {
        self.state
            .write()
            .await
            .silenced
            .insert(command.to_string());
    }

    pub async fn received(&self) -> Vec<String> {
        self.state.read().await.received.clone()
    }

    pub async fn clear_received(&self) {
        self.state.write().await.received.clear();
    }

    /// Send an unsolicited status line to every open connection
    pub fn push(&self, line: &str) {
        let _ = self.control.send(Control::Push(line.to_string()));
    }

    /// Drop every open connection; the listener keeps accepting
    pub fn close_connections(&self) {
        let _ = self.control.send(Control::Close);
    }

    /// Stop the mock server
    pub async fn stop(self) {
        self.close_connections();
        self.handle.abort();
    }
}

/// Handle a single TCP connection
async fn handle_connection(
    stream: TcpStream,
    state: Arc<RwLock<MockLyngdorfState>>,
    mut control: broadcast::Receiver<Control>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = FramedRead::new(
        reader,
        AnyDelimiterCodec::new(b"\r\n".to_vec(), b"\r".to_vec()),
    );

    loop {
        let outgoing = tokio::select! {
            frame = lines.next() => match frame {
                Some(Ok(frame)) => {
                    let line = String::from_utf8_lossy(&frame).trim().to_string();
                    match line.strip_prefix('!') {
                        Some(command) => process_command(command, &state).await,
                        None => Vec::new(),
                    }
                }
                _ => break,
            },
            msg = control.recv() => match msg {
                Ok(Control::Push(line)) => vec![line],
                Ok(Control::Close) | Err(_) => break,
            },
        };

        for line in outgoing {
            if writer
                .write_all(format!("{}\r\n", line).as_bytes())
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

/// Process a command and return the lines to send back
async fn process_command(command: &str, state: &Arc<RwLock<MockLyngdorfState>>) -> Vec<String> {
    let mut state = state.write().await;
    state.received.push(command.to_string());
    if state.silenced.contains(command) {
        return Vec::new();
    }

    let mut out = vec![format!("#{}", command)];
    if command.ends_with('?') {
        out.extend(state.responses.get(command).cloned().unwrap_or_default());
        return out;
    }

    let status = match command {
        "MUTEON" | "MUTEOFF" => Some(("MUTE?", format!("!{}", command))),
        "POWERONMAIN" => Some(("POWER?", "!POWER(ON)".to_string())),
        "POWEROFFMAIN" => Some(("POWER?", "!POWER(OFF)".to_string())),
        "VOL+" | "VOL-" => {
            let current = state
                .responses
                .get("VOL?")
                .and_then(|lines| lines.first())
                .and_then(|l| l.strip_prefix("!VOL(")?.strip_suffix(')')?.parse::<i64>().ok())
                .unwrap_or(-500);
            let step = if command == "VOL+" { 5 } else { -5 };
            Some(("VOL?", format!("!VOL({})", current + step)))
        }
        _ => None,
    };

    let status = status.map(|(q, l)| (q.to_string(), l)).or_else(|| {
        let (name, _) = command.split_once('(')?;
        let query = format!("{}?", name);
        state
            .responses
            .contains_key(&query)
            .then(|| (query, format!("!{}", command)))
    });

    if let Some((query, line)) = status {
        state.responses.insert(query, vec![line.clone()]);
        out.push(line);
    }
    out
}
