//! Connection manager and command transport
//!
//! One `Client` owns one socket. A supervisor task runs the listener session
//! and reconnects with backoff when the link drops. Commands are written
//! through the session and claim a single in-flight slot while they wait for
//! the line that confirms them; everything else the processor says is decoded
//! into the state cache as it arrives.

pub mod connection;

use std::sync::{Arc, Mutex, OnceLock};

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{DeviceEvent, SharedBus};
use crate::config::DeviceConfig;
use crate::error::{LyngdorfError, Result};
use crate::model::{Capabilities, DeviceModel, GENERIC};
use crate::protocol::commands::{Command, Query, QuerySpec};
use crate::protocol::{format_command, Message};
use crate::state::decoder::{Decoder, Update};
use crate::state::{Param, StateCache, Value};

use connection::{Backoff, Link};

/// Lines queued for the writer before `send` waits
const OUTBOUND_CAPACITY: usize = 32;

const KEEPALIVE_QUERY: &str = "VERB?";

/// Link state as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts exhausted; calls fail fast while probing continues
    Unavailable,
}

/// How the reply to a request is recognised
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// `#<text>` echo of the command itself
    Echo(String),
    /// Any status line with one of these names
    Event(&'static [&'static str]),
}

impl Matcher {
    pub fn matches(&self, msg: &Message) -> bool {
        match self {
            Matcher::Echo(text) => msg.echoed_command() == Some(text.as_str()),
            Matcher::Event(names) => msg.is_status() && names.contains(&msg.name.as_str()),
        }
    }
}

/// A line to write and, optionally, the reply to wait for
#[derive(Debug, Clone)]
pub struct Request {
    /// Command text without the leading `!`
    pub command: String,
    pub matcher: Option<Matcher>,
}

impl Request {
    /// A command confirmed by its echo.
    pub fn confirmed(command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            matcher: Some(Matcher::Echo(command.clone())),
            command,
        }
    }

    /// A command written without waiting for anything.
    pub fn unconfirmed(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            matcher: None,
        }
    }

    pub fn query(spec: &QuerySpec) -> Self {
        Self {
            command: spec.text.to_string(),
            matcher: Some(Matcher::Event(spec.replies)),
        }
    }
}

struct Pending {
    matcher: Matcher,
    reply: oneshot::Sender<Result<Message>>,
}

struct Inner {
    config: DeviceConfig,
    state: StateCache,
    bus: SharedBus,
    model: OnceLock<DeviceModel>,
    status: watch::Sender<LinkStatus>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    pending: Mutex<Option<Pending>>,
    in_flight: tokio::sync::Mutex<()>,
    /// Held for the whole of `connect` so only one supervisor ever exists
    connecting: tokio::sync::Mutex<()>,
    shutdown: Mutex<Option<CancellationToken>>,
}

/// Protocol client for one processor
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub fn new(config: DeviceConfig, bus: SharedBus) -> Self {
        let model = OnceLock::new();
        if let Some(known) = config.model {
            model.get_or_init(|| known);
        }
        let (status, _) = watch::channel(LinkStatus::Disconnected);

        Self {
            inner: Arc::new(Inner {
                config,
                state: StateCache::new(),
                bus,
                model,
                status,
                outbound: Mutex::new(None),
                pending: Mutex::new(None),
                in_flight: tokio::sync::Mutex::new(()),
                connecting: tokio::sync::Mutex::new(()),
                shutdown: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn state(&self) -> &StateCache {
        &self.inner.state
    }

    pub fn bus(&self) -> &SharedBus {
        &self.inner.bus
    }

    pub fn status(&self) -> LinkStatus {
        *self.inner.status.borrow()
    }

    /// Receiver that observes every link status transition.
    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.inner.status.subscribe()
    }

    /// Detected (or configured) model, once known.
    pub fn model(&self) -> Option<DeviceModel> {
        self.inner.model.get().copied()
    }

    /// Capability set of the detected model; the common set until then.
    pub fn capabilities(&self) -> &'static Capabilities {
        self.inner.capabilities()
    }

    /// Open the socket, start the listener and query the full device state.
    ///
    /// Returns once the initial queries have been answered or timed out.
    /// Calling this on a running client is a no-op, except that it fails
    /// with `DeviceUnavailable` while reconnect attempts are exhausted.
    pub async fn connect(&self) -> Result<()> {
        let connect_guard = self.inner.connecting.lock().await;
        if self.inner.is_running() {
            return match self.status() {
                LinkStatus::Unavailable => Err(LyngdorfError::DeviceUnavailable),
                _ => Ok(()),
            };
        }

        let config = &self.inner.config;
        self.inner.set_status(LinkStatus::Connecting);
        let link = match connection::open(&config.host, config.port, config.connect_timeout()).await
        {
            Ok(link) => link,
            Err(e) => {
                self.inner.set_status(LinkStatus::Disconnected);
                return Err(e);
            }
        };

        let shutdown = CancellationToken::new();
        if let Ok(mut slot) = self.inner.shutdown.lock() {
            *slot = Some(shutdown.clone());
        }

        let outbound = self.inner.attach();
        info!("Connected to Lyngdorf at {}", config.address());

        let inner = self.inner.clone();
        tokio::spawn(async move { supervise(inner, link, outbound, shutdown).await });

        self.inner.initialize().await;
        drop(connect_guard);
        Ok(())
    }

    /// Close the socket and stop background tasks. Pending and future calls
    /// fail with `DeviceUnavailable` until the next `connect`.
    pub fn disconnect(&self) {
        let shutdown = self.inner.shutdown.lock().ok().and_then(|mut s| s.take());
        let was_running = shutdown.is_some();
        if let Some(token) = shutdown {
            token.cancel();
        }

        self.inner.teardown();
        self.inner.set_status(LinkStatus::Disconnected);

        if was_running {
            info!("Disconnected from {}", self.inner.config.address());
            self.inner.bus.publish(DeviceEvent::Disconnected {
                host: self.inner.config.host.clone(),
                reason: "closed by client".to_string(),
            });
        }
    }

    /// Write one request and wait for its reply, if it expects one.
    pub async fn send(&self, request: Request) -> Result<Option<Message>> {
        self.inner.send(request).await
    }

    /// Render and send a command for the active capability set.
    pub async fn send_command(&self, command: Command, arg: Option<i64>) -> Result<()> {
        let text = self.capabilities().render(command, arg)?;
        let request = if command.awaits_echo() {
            Request::confirmed(text)
        } else {
            Request::unconfirmed(text)
        };
        self.send(request).await.map(|_| ())
    }

    /// Run a query and return its reply line.
    pub async fn query(&self, query: Query) -> Result<Option<Message>> {
        let spec = self.capabilities().query(query).ok_or_else(|| {
            LyngdorfError::Unsupported(format!(
                "{:?} query on {:?} processors",
                query,
                self.capabilities().family
            ))
        })?;
        self.send(Request::query(spec)).await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(token) = self.inner.shutdown.lock().ok().and_then(|mut s| s.take()) {
            token.cancel();
        }
    }
}

impl Inner {
    fn capabilities(&self) -> &'static Capabilities {
        self.model
            .get()
            .map(|model| model.capabilities())
            .unwrap_or(&GENERIC)
    }

    fn is_running(&self) -> bool {
        self.shutdown
            .lock()
            .map(|s| s.as_ref().is_some_and(|token| !token.is_cancelled()))
            .unwrap_or(false)
    }

    fn set_status(&self, status: LinkStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!("{}: {:?} -> {:?}", self.config.address(), previous, status);
        }
    }

    /// Install a fresh outbound queue and mark the link connected.
    fn attach(&self) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        if let Ok(mut outbound) = self.outbound.lock() {
            *outbound = Some(tx);
        }
        self.set_status(LinkStatus::Connected);
        self.bus.publish(DeviceEvent::Connected {
            host: self.config.host.clone(),
        });
        rx
    }

    /// Drop the outbound queue, fail the waiter and forget all state.
    fn teardown(&self) {
        if let Ok(mut outbound) = self.outbound.lock() {
            outbound.take();
        }
        self.fail_pending(LyngdorfError::DeviceUnavailable);
        self.clear_state();
    }

    fn clear_state(&self) {
        let cleared: Vec<Param> = self.state.snapshot().into_keys().collect();
        self.state.clear();
        for param in cleared {
            self.bus.publish(DeviceEvent::StateChanged { param, value: None });
        }
    }

    fn outbound_sender(&self) -> Result<mpsc::Sender<String>> {
        if *self.status.borrow() != LinkStatus::Connected {
            return Err(LyngdorfError::DeviceUnavailable);
        }
        self.outbound
            .lock()
            .ok()
            .and_then(|outbound| outbound.as_ref().cloned())
            .ok_or(LyngdorfError::DeviceUnavailable)
    }

    fn shutdown_token(&self) -> Option<CancellationToken> {
        self.shutdown.lock().ok().and_then(|s| s.clone())
    }

    async fn send(&self, request: Request) -> Result<Option<Message>> {
        let slot = self.in_flight.lock().await;
        let shutdown = self
            .shutdown_token()
            .ok_or(LyngdorfError::DeviceUnavailable)?;
        let outbound = self.outbound_sender()?;
        let line = format_command(&request.command);

        let Some(matcher) = request.matcher else {
            outbound
                .send(line)
                .await
                .map_err(|_| LyngdorfError::DeviceUnavailable)?;
            return Ok(None);
        };

        // The waiter must be in place before the reply can possibly arrive
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(Pending { matcher, reply: tx });
        }

        if outbound.send(line).await.is_err() {
            self.clear_pending();
            return Err(LyngdorfError::DeviceUnavailable);
        }

        // A disconnect may have torn down before the waiter was installed
        let command_timeout = self.config.command_timeout();
        let result = tokio::select! {
            _ = shutdown.cancelled() => {
                self.clear_pending();
                Err(LyngdorfError::DeviceUnavailable)
            }
            reply = timeout(command_timeout, rx) => match reply {
                Ok(Ok(reply)) => reply.map(Some),
                Ok(Err(_)) => Err(LyngdorfError::DeviceUnavailable),
                Err(_) => {
                    self.clear_pending();
                    warn!("No reply to {} within {:?}", request.command, command_timeout);
                    Err(LyngdorfError::CommandTimeout {
                        command: request.command,
                        timeout_ms: command_timeout.as_millis() as u64,
                    })
                }
            },
        };

        drop(slot);
        result
    }

    fn clear_pending(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.take();
        }
    }

    fn fail_pending(&self, error: LyngdorfError) {
        let pending = self.pending.lock().ok().and_then(|mut p| p.take());
        if let Some(pending) = pending {
            if pending.reply.send(Err(error)).is_err() {
                debug!("Pending command already abandoned");
            }
        }
    }

    fn resolve(&self, msg: Message) {
        let pending = self.pending.lock().ok().and_then(|mut p| {
            if p.as_ref().is_some_and(|pending| pending.matcher.matches(&msg)) {
                p.take()
            } else {
                None
            }
        });
        if let Some(pending) = pending {
            if pending.reply.send(Ok(msg)).is_err() {
                debug!("Reply arrived after caller gave up");
            }
        }
    }

    /// Turn verbose mode on, detect the model, then read the full state.
    async fn initialize(&self) {
        match self.capabilities().render(Command::Verbose, Some(2)) {
            Ok(verbose) => {
                if let Err(e) = self.send(Request::unconfirmed(verbose)).await {
                    warn!("Failed to enable verbose mode: {}", e);
                    return;
                }
            }
            Err(e) => warn!("Failed to render verbose command: {}", e),
        }

        if let Some(spec) = self.capabilities().query(Query::Device) {
            if let Err(e) = self.send(Request::query(spec)).await {
                warn!("Model detection failed: {}", e);
            }
        }

        // Capabilities may have changed with the DEVICE reply
        for spec in self.capabilities().queries() {
            if matches!(spec.query, Query::Verbose | Query::Device) {
                continue;
            }
            match self.send(Request::query(spec)).await {
                Ok(_) => {}
                Err(LyngdorfError::DeviceUnavailable) => {
                    debug!("Link lost during initial queries");
                    return;
                }
                Err(e) => warn!("Initial {} failed: {}", spec.text, e),
            }
        }
        debug!("Initial state: {} parameters", self.state.len());
    }

    /// Decode one inbound frame, update the cache, then wake the waiter.
    fn handle_frame(&self, decoder: &mut Decoder, frame: &[u8]) {
        let Ok(line) = std::str::from_utf8(frame) else {
            warn!("Dropping non-UTF-8 line ({} bytes)", frame.len());
            return;
        };
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        debug!("<- {}", line);

        let msg = match Message::parse(line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };

        match decoder.decode(&msg, self.capabilities()) {
            Ok(updates) => {
                for update in updates {
                    self.apply(update);
                }
            }
            Err(e) => warn!("Ignoring {}: {}", line, e),
        }

        self.resolve(msg);
    }

    fn apply(&self, update: Update) {
        let Update { param, value } = update;
        let changed = match &value {
            Some(v) => self.state.set(param, v.clone()),
            None => self.state.remove(param),
        };
        if !changed {
            return;
        }

        if let (Param::Model, Some(Value::Text(name))) = (param, &value) {
            self.detect_model(name);
        }
        self.bus.publish(DeviceEvent::StateChanged { param, value });
    }

    fn detect_model(&self, name: &str) {
        match name.parse::<DeviceModel>() {
            Ok(model) => {
                let active = *self.model.get_or_init(|| model);
                if active != model {
                    warn!("Device reports {} but {} is configured", model, active);
                }
                info!("Detected Lyngdorf {}", model);
                self.bus.publish(DeviceEvent::ModelDetected { model });
            }
            Err(e) => warn!("{}; using the common command set", e),
        }
    }
}

/// Own the link: run sessions and reconnect until cancelled.
async fn supervise(
    inner: Arc<Inner>,
    mut link: Link,
    mut outbound: mpsc::Receiver<String>,
    shutdown: CancellationToken,
) {
    let mut backoff = Backoff::from_config(&inner.config.reconnect);

    loop {
        let reason = tokio::select! {
            _ = shutdown.cancelled() => break,
            reason = run_session(&inner, link, outbound) => reason,
        };

        inner.teardown();
        if shutdown.is_cancelled() {
            break;
        }

        warn!("Lost connection to {}: {}", inner.config.address(), reason);
        inner.set_status(LinkStatus::Connecting);
        inner.bus.publish(DeviceEvent::Disconnected {
            host: inner.config.host.clone(),
            reason,
        });

        link = match reconnect(&inner, &mut backoff, &shutdown).await {
            Some(link) => link,
            None => break,
        };
        backoff.reset();
        outbound = inner.attach();
        info!("Reconnected to {}", inner.config.address());

        let init = inner.clone();
        tokio::spawn(async move { init.initialize().await });
    }

    debug!("Supervisor for {} stopped", inner.config.address());
}

/// Retry with backoff. Returns `None` only when cancelled.
async fn reconnect(
    inner: &Inner,
    backoff: &mut Backoff,
    shutdown: &CancellationToken,
) -> Option<Link> {
    let config = &inner.config;

    loop {
        let delay = if backoff.attempts() >= config.reconnect.max_attempts {
            config.reconnect.max_delay()
        } else {
            backoff.next_delay()
        };

        tokio::select! {
            _ = shutdown.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        match connection::open(&config.host, config.port, config.connect_timeout()).await {
            Ok(link) => return Some(link),
            Err(e) => {
                debug!("Reconnect to {} failed: {}", config.address(), e);
                if backoff.attempts() == config.reconnect.max_attempts
                    && *inner.status.borrow() != LinkStatus::Unavailable
                {
                    warn!(
                        "{} unreachable after {} attempts, probing every {:?}",
                        config.address(),
                        backoff.attempts(),
                        config.reconnect.max_delay()
                    );
                    inner.set_status(LinkStatus::Unavailable);
                    inner.bus.publish(DeviceEvent::Unavailable {
                        host: config.host.clone(),
                        attempts: backoff.attempts(),
                    });
                }
            }
        }
    }
}

/// Pump one socket until it fails. Returns why it ended.
async fn run_session(inner: &Inner, link: Link, mut outbound: mpsc::Receiver<String>) -> String {
    let Link {
        mut reader,
        mut writer,
    } = link;
    let mut decoder = Decoder::new();
    let interval = inner.config.monitor_interval();
    let mut last_inbound = Instant::now();
    let mut probed = false;

    loop {
        let deadline = if probed {
            last_inbound + interval * 2
        } else {
            last_inbound + interval
        };

        tokio::select! {
            frame = reader.next() => match frame {
                Some(Ok(frame)) => {
                    last_inbound = Instant::now();
                    probed = false;
                    inner.handle_frame(&mut decoder, &frame);
                }
                Some(Err(e)) => return format!("read failed: {}", e),
                None => return "connection closed by device".to_string(),
            },
            line = outbound.recv() => match line {
                Some(line) => {
                    debug!("-> {}", line);
                    if let Err(e) = writer.send(line).await {
                        return format!("write failed: {}", e);
                    }
                }
                None => return "outbound queue closed".to_string(),
            },
            _ = tokio::time::sleep_until(deadline) => {
                if probed {
                    return format!("no traffic for {:?}", interval * 2);
                }
                debug!("Idle for {:?}, sending keep-alive", interval);
                if let Err(e) = writer.send(format_command(KEEPALIVE_QUERY)).await {
                    return format!("keep-alive failed: {}", e);
                }
                probed = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::create_bus;

    #[test]
    fn test_echo_matcher() {
        let matcher = Matcher::Echo("VOL(-300)".to_string());
        assert!(matcher.matches(&Message::parse("#VOL(-300)").unwrap()));
        assert!(!matcher.matches(&Message::parse("#VOL(-200)").unwrap()));
        assert!(!matcher.matches(&Message::parse("!VOL(-300)").unwrap()));
    }

    #[test]
    fn test_event_matcher() {
        let matcher = Matcher::Event(&["MUTE", "MUTEON", "MUTEOFF"]);
        assert!(matcher.matches(&Message::parse("!MUTEON").unwrap()));
        assert!(!matcher.matches(&Message::parse("#MUTE?").unwrap()));
        assert!(!matcher.matches(&Message::parse("!VOL(-300)").unwrap()));
    }

    #[test]
    fn test_query_request_uses_reply_names() {
        let spec = GENERIC.query(Query::Volume).unwrap();
        let request = Request::query(spec);
        assert_eq!(request.command, "VOL?");
        assert_eq!(request.matcher, Some(Matcher::Event(spec.replies)));
    }

    #[test]
    fn test_configured_model_selects_capabilities() {
        let config = DeviceConfig::new("127.0.0.1").with_model(DeviceModel::Tdai3400);
        let client = Client::new(config, create_bus());
        assert_eq!(client.model(), Some(DeviceModel::Tdai3400));
        assert!(std::ptr::eq(client.capabilities(), DeviceModel::Tdai3400.capabilities()));
    }

    #[tokio::test]
    async fn test_send_while_disconnected_fails_fast() {
        let client = Client::new(DeviceConfig::new("127.0.0.1"), create_bus());
        assert_eq!(client.status(), LinkStatus::Disconnected);
        let result = client.send(Request::confirmed("MUTEON")).await;
        assert_eq!(result, Err(LyngdorfError::DeviceUnavailable));
    }

    #[test]
    fn test_handle_frame_updates_state_and_resolves() {
        let client = Client::new(DeviceConfig::new("127.0.0.1"), create_bus());
        let inner = &client.inner;
        let (tx, mut rx) = oneshot::channel();
        *inner.pending.lock().unwrap() = Some(Pending {
            matcher: Matcher::Event(&["VOL"]),
            reply: tx,
        });

        let mut decoder = Decoder::new();
        inner.handle_frame(&mut decoder, b"#VOL?");
        assert!(rx.try_recv().is_err());

        inner.handle_frame(&mut decoder, b"!VOL(-405)");
        let reply = rx.try_recv().unwrap().unwrap();
        assert_eq!(reply.name, "VOL");
        assert_eq!(client.state().get(Param::Volume), Some(Value::Number(-40.5)));
    }

    #[test]
    fn test_handle_frame_skips_garbage() {
        let client = Client::new(DeviceConfig::new("127.0.0.1"), create_bus());
        let mut decoder = Decoder::new();
        client.inner.handle_frame(&mut decoder, b"");
        client.inner.handle_frame(&mut decoder, &[0xff, 0xfe]);
        client.inner.handle_frame(&mut decoder, b"garbage");
        assert!(client.state().is_empty());
    }

    #[test]
    fn test_device_line_detects_model() {
        let bus = create_bus();
        let mut rx = bus.subscribe();
        let client = Client::new(DeviceConfig::new("127.0.0.1"), bus);
        assert!(client.model().is_none());

        client
            .inner
            .handle_frame(&mut Decoder::new(), br#"!DEVICE"MP-50""#);
        assert_eq!(client.model(), Some(DeviceModel::Mp50));
        assert!(client.capabilities().multichannel);

        let mut saw_model = false;
        while let Ok(event) = rx.try_recv() {
            if event == (DeviceEvent::ModelDetected { model: DeviceModel::Mp50 }) {
                saw_model = true;
            }
        }
        assert!(saw_model);
    }

    #[test]
    fn test_teardown_fails_pending_and_clears_state() {
        let client = Client::new(DeviceConfig::new("127.0.0.1"), create_bus());
        let inner = &client.inner;
        inner.state.set(Param::Mute, Value::Bool(true));
        let (tx, mut rx) = oneshot::channel();
        *inner.pending.lock().unwrap() = Some(Pending {
            matcher: Matcher::Echo("MUTEOFF".to_string()),
            reply: tx,
        });

        inner.teardown();
        assert_eq!(rx.try_recv().unwrap(), Err(LyngdorfError::DeviceUnavailable));
        assert!(client.state().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_link_releases_installed_waiter() {
        let client = Client::new(DeviceConfig::new("127.0.0.1"), create_bus());
        let token = CancellationToken::new();
        *client.inner.shutdown.lock().unwrap() = Some(token.clone());
        let mut outbound = client.inner.attach();

        let inner = client.inner.clone();
        let waiter = tokio::spawn(async move { inner.send(Request::confirmed("MUTEON")).await });

        // The line is written after the waiter is installed
        assert_eq!(outbound.recv().await.as_deref(), Some("!MUTEON"));
        token.cancel();

        let result = timeout(std::time::Duration::from_millis(500), waiter)
            .await
            .expect("waiter released before command timeout")
            .unwrap();
        assert_eq!(result, Err(LyngdorfError::DeviceUnavailable));
        assert!(client.inner.pending.lock().unwrap().is_none());
    }
}
