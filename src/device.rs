//! High-level device API
//!
//! `Lyngdorf` wraps a [`Client`] with typed operations. Setters validate
//! their arguments before anything is written to the socket; getters read the
//! state cache and never block on I/O.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::bus::{create_bus, DeviceEvent, SharedBus};
use crate::client::{Client, LinkStatus};
use crate::config::DeviceConfig;
use crate::error::{LyngdorfError, Result};
use crate::model::DeviceModel;
use crate::protocol::commands::Command;
use crate::state::lists::index_of;
use crate::state::volume::{VolumeCurve, DEFAULT_MAX_VOLUME_DB, MIN_VOLUME_DB};
use crate::state::{ListEntry, Param, Value};

pub const DEFAULT_MIN_LIPSYNC: i64 = 0;
pub const DEFAULT_MAX_LIPSYNC: i64 = 500;

/// Bass and treble trims accept ±12 dB
pub const TRIM_RANGE_BASS_TREBLE: f64 = 12.0;
/// Channel trims accept ±10 dB
pub const TRIM_RANGE_CHANNEL: f64 = 10.0;

/// How long `probe` waits for the model after connecting
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Lyngdorf {
    client: Client,
}

impl Lyngdorf {
    pub fn new(config: DeviceConfig) -> Self {
        Self::with_bus(config, create_bus())
    }

    /// Publish device events on an existing bus.
    pub fn with_bus(config: DeviceConfig, bus: SharedBus) -> Self {
        Self {
            client: Client::new(config, bus),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn host(&self) -> &str {
        &self.client.config().host
    }

    pub async fn connect(&self) -> Result<()> {
        self.client.connect().await
    }

    pub fn disconnect(&self) {
        self.client.disconnect()
    }

    pub fn status(&self) -> LinkStatus {
        self.client.status()
    }

    pub fn is_available(&self) -> bool {
        self.status() == LinkStatus::Connected
    }

    pub fn model(&self) -> Option<DeviceModel> {
        self.client.model()
    }

    pub fn multichannel(&self) -> bool {
        self.client.capabilities().multichannel
    }

    pub fn get_state(&self, param: Param) -> Option<Value> {
        self.client.state().get(param)
    }

    pub fn snapshot(&self) -> HashMap<Param, Value> {
        self.client.state().snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.client.bus().subscribe()
    }

    /// Device events as a stream. Events missed by a lagging consumer are skipped.
    pub fn changes(&self) -> impl Stream<Item = DeviceEvent> {
        BroadcastStream::new(self.subscribe()).filter_map(|event| event.ok())
    }

    /// Write a parameter by value, dispatching to the typed setter.
    pub async fn set_state(&self, param: Param, value: Value) -> Result<()> {
        match param {
            Param::Power => {
                if expect_bool(param, &value)? {
                    self.power_on().await
                } else {
                    self.power_off().await
                }
            }
            Param::Volume => self.set_volume(expect_f64(param, &value)?).await,
            Param::VolumeLevel => self.set_volume_level(expect_f64(param, &value)?).await,
            Param::Mute => self.mute(expect_bool(param, &value)?).await,
            Param::Source => self.set_source(expect_str(param, &value)?).await,
            Param::Voicing => self.set_voicing(expect_str(param, &value)?).await,
            Param::FocusPosition => self.set_focus_position(expect_str(param, &value)?).await,
            Param::AudioMode => self.set_audio_mode(expect_str(param, &value)?).await,
            Param::Lipsync => {
                let ms = value
                    .as_i64()
                    .ok_or_else(|| wrong_type(param, &value))?;
                self.set_lipsync(ms).await
            }
            Param::BassTrim => self.set_bass_trim(expect_f64(param, &value)?).await,
            Param::TrebleTrim => self.set_treble_trim(expect_f64(param, &value)?).await,
            Param::CenterTrim => self.set_center_trim(expect_f64(param, &value)?).await,
            Param::HeightsTrim => self.set_heights_trim(expect_f64(param, &value)?).await,
            Param::LfeTrim => self.set_lfe_trim(expect_f64(param, &value)?).await,
            Param::SurroundsTrim => self.set_surrounds_trim(expect_f64(param, &value)?).await,
            _ => Err(LyngdorfError::Unsupported(format!("{} is read-only", param))),
        }
    }

    pub async fn send_command(&self, command: Command, arg: Option<i64>) -> Result<()> {
        debug!("{}: {} {:?}", self.host(), command, arg);
        self.client.send_command(command, arg).await
    }

    /// Send a command by its stable name, e.g. `"VOLUME_UP"`.
    pub async fn send_command_by_name(&self, name: &str, arg: Option<i64>) -> Result<()> {
        let command: Command = name.parse()?;
        self.send_command(command, arg).await
    }

    pub async fn power_on(&self) -> Result<()> {
        self.send_command(Command::PowerOn, None).await
    }

    pub async fn power_off(&self) -> Result<()> {
        self.send_command(Command::PowerOff, None).await
    }

    pub async fn volume_up(&self) -> Result<()> {
        self.send_command(Command::VolumeUp, None).await
    }

    pub async fn volume_down(&self) -> Result<()> {
        self.send_command(Command::VolumeDown, None).await
    }

    /// Set the volume in dB, between -99.9 and the current max volume.
    pub async fn set_volume(&self, db: f64) -> Result<()> {
        let max = self.max_volume();
        if !(MIN_VOLUME_DB..=max).contains(&db) {
            return Err(LyngdorfError::InvalidArgument(format!(
                "volume {} dB outside {}..={}",
                db, MIN_VOLUME_DB, max
            )));
        }
        self.send_command(Command::Volume, Some(tenths(db))).await
    }

    /// Set the volume on the 0..1 scale.
    pub async fn set_volume_level(&self, level: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&level) {
            return Err(LyngdorfError::InvalidArgument(format!(
                "volume level {} outside 0..=1",
                level
            )));
        }
        let db = VolumeCurve::new(self.max_volume()).level_to_db(level);
        self.set_volume(db).await
    }

    pub async fn mute(&self, mute: bool) -> Result<()> {
        let command = if mute {
            Command::MuteOn
        } else {
            Command::MuteOff
        };
        self.send_command(command, None).await
    }

    pub async fn set_source(&self, name: &str) -> Result<()> {
        self.select(Param::SourceList, Command::Source, name).await
    }

    pub async fn set_voicing(&self, name: &str) -> Result<()> {
        self.select(Param::VoicingList, Command::Voicing, name).await
    }

    pub async fn set_focus_position(&self, name: &str) -> Result<()> {
        self.select(Param::FocusPositionList, Command::FocusPosition, name)
            .await
    }

    pub async fn set_audio_mode(&self, name: &str) -> Result<()> {
        self.select(Param::AudioModeList, Command::AudioMode, name)
            .await
    }

    /// Set the lipsync delay in ms, within the range the device reported.
    pub async fn set_lipsync(&self, ms: i64) -> Result<()> {
        let (min, max) = self.lipsync_range();
        if !(min..=max).contains(&ms) {
            return Err(LyngdorfError::InvalidArgument(format!(
                "lipsync {} ms outside {}..={}",
                ms, min, max
            )));
        }
        self.send_command(Command::Lipsync, Some(ms)).await
    }

    pub async fn play(&self) -> Result<()> {
        self.send_command(Command::Play, None).await
    }

    pub async fn next(&self) -> Result<()> {
        self.send_command(Command::Next, None).await
    }

    pub async fn previous(&self) -> Result<()> {
        self.send_command(Command::Previous, None).await
    }

    pub async fn set_bass_trim(&self, db: f64) -> Result<()> {
        self.set_trim(Command::BassTrim, db, TRIM_RANGE_BASS_TREBLE)
            .await
    }

    pub async fn set_treble_trim(&self, db: f64) -> Result<()> {
        self.set_trim(Command::TrebleTrim, db, TRIM_RANGE_BASS_TREBLE)
            .await
    }

    pub async fn set_center_trim(&self, db: f64) -> Result<()> {
        self.set_trim(Command::CenterTrim, db, TRIM_RANGE_CHANNEL)
            .await
    }

    pub async fn set_heights_trim(&self, db: f64) -> Result<()> {
        self.set_trim(Command::HeightsTrim, db, TRIM_RANGE_CHANNEL)
            .await
    }

    pub async fn set_lfe_trim(&self, db: f64) -> Result<()> {
        self.set_trim(Command::LfeTrim, db, TRIM_RANGE_CHANNEL).await
    }

    pub async fn set_surrounds_trim(&self, db: f64) -> Result<()> {
        self.set_trim(Command::SurroundsTrim, db, TRIM_RANGE_CHANNEL)
            .await
    }

    async fn set_trim(&self, command: Command, db: f64, range: f64) -> Result<()> {
        if !db.is_finite() || db.abs() > range {
            return Err(LyngdorfError::InvalidArgument(format!(
                "trim {} dB outside -{}..={}",
                db, range, range
            )));
        }
        self.send_command(command, Some(tenths(db))).await
    }

    async fn select(&self, list: Param, command: Command, name: &str) -> Result<()> {
        let entries = self.list(list);
        let index = index_of(&entries, name).ok_or_else(|| {
            LyngdorfError::InvalidArgument(format!("no {} entry named {:?}", list, name))
        })?;
        self.send_command(command, Some(index)).await
    }

    // Cached state

    pub fn power(&self) -> Option<bool> {
        self.bool(Param::Power)
    }

    pub fn volume(&self) -> Option<f64> {
        self.number(Param::Volume)
    }

    pub fn volume_level(&self) -> Option<f64> {
        self.number(Param::VolumeLevel)
    }

    /// Reported max volume, or 12 dB until the device says otherwise.
    pub fn max_volume(&self) -> f64 {
        self.number(Param::MaxVolume)
            .unwrap_or(DEFAULT_MAX_VOLUME_DB)
    }

    pub fn muted(&self) -> Option<bool> {
        self.bool(Param::Mute)
    }

    pub fn sources(&self) -> Vec<String> {
        names(self.list(Param::SourceList))
    }

    pub fn source(&self) -> Option<String> {
        self.text(Param::Source)
    }

    pub fn stream_type(&self) -> Option<String> {
        self.text(Param::StreamType)
    }

    pub fn voicings(&self) -> Vec<String> {
        names(self.list(Param::VoicingList))
    }

    pub fn voicing(&self) -> Option<String> {
        self.text(Param::Voicing)
    }

    pub fn focus_positions(&self) -> Vec<String> {
        names(self.list(Param::FocusPositionList))
    }

    pub fn focus_position(&self) -> Option<String> {
        self.text(Param::FocusPosition)
    }

    pub fn audio_modes(&self) -> Vec<String> {
        names(self.list(Param::AudioModeList))
    }

    pub fn audio_mode(&self) -> Option<String> {
        self.text(Param::AudioMode)
    }

    pub fn audio_input(&self) -> Option<String> {
        self.text(Param::AudioInput)
    }

    pub fn audio_type(&self) -> Option<String> {
        self.text(Param::AudioType)
    }

    pub fn video_input(&self) -> Option<String> {
        self.text(Param::VideoInput)
    }

    pub fn video_type(&self) -> Option<String> {
        self.text(Param::VideoType)
    }

    pub fn video_output(&self) -> Option<String> {
        self.text(Param::VideoOutput)
    }

    pub fn lipsync(&self) -> Option<i64> {
        self.get_state(Param::Lipsync).and_then(|v| v.as_i64())
    }

    /// Reported lipsync range, or 0..=500 ms until the device says otherwise.
    pub fn lipsync_range(&self) -> (i64, i64) {
        match self.get_state(Param::LipsyncRange) {
            Some(Value::Range { min, max }) => (min, max),
            _ => (DEFAULT_MIN_LIPSYNC, DEFAULT_MAX_LIPSYNC),
        }
    }

    pub fn dts_dialog_available(&self) -> Option<bool> {
        self.bool(Param::DtsDialogAvailable)
    }

    pub fn dts_dialog(&self) -> Option<f64> {
        self.number(Param::DtsDialog)
    }

    pub fn loudness(&self) -> Option<bool> {
        self.bool(Param::Loudness)
    }

    pub fn bass_trim(&self) -> Option<f64> {
        self.number(Param::BassTrim)
    }

    pub fn treble_trim(&self) -> Option<f64> {
        self.number(Param::TrebleTrim)
    }

    pub fn center_trim(&self) -> Option<f64> {
        self.number(Param::CenterTrim)
    }

    pub fn heights_trim(&self) -> Option<f64> {
        self.number(Param::HeightsTrim)
    }

    pub fn lfe_trim(&self) -> Option<f64> {
        self.number(Param::LfeTrim)
    }

    pub fn surrounds_trim(&self) -> Option<f64> {
        self.number(Param::SurroundsTrim)
    }

    fn bool(&self, param: Param) -> Option<bool> {
        self.get_state(param).and_then(|v| v.as_bool())
    }

    fn number(&self, param: Param) -> Option<f64> {
        self.get_state(param).and_then(|v| v.as_f64())
    }

    fn text(&self, param: Param) -> Option<String> {
        match self.get_state(param) {
            Some(Value::Text(s)) => Some(s),
            _ => None,
        }
    }

    fn list(&self, param: Param) -> Vec<ListEntry> {
        match self.get_state(param) {
            Some(Value::List(entries)) => entries,
            _ => Vec::new(),
        }
    }
}

/// Connect, wait for the model line and disconnect again.
pub async fn probe(host: &str, port: u16) -> Result<DeviceModel> {
    let device = Lyngdorf::new(DeviceConfig::new(host).with_port(port));
    device.connect().await?;

    let mut events = device.subscribe();
    let detected = device.model();
    let model = match detected {
        Some(model) => Some(model),
        None => tokio::time::timeout(PROBE_TIMEOUT, async {
            loop {
                match events.recv().await {
                    Ok(DeviceEvent::ModelDetected { model }) => break Some(model),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break None,
                }
            }
        })
        .await
        .ok()
        .flatten(),
    };
    device.disconnect();

    match model {
        Some(model) => {
            info!("Probe of {}:{} found {}", host, port, model);
            Ok(model)
        }
        None => Err(LyngdorfError::Unsupported(format!(
            "{}:{} did not report a known model",
            host, port
        ))),
    }
}

/// dB as the device's tenths, rounded to the nearest step.
fn tenths(db: f64) -> i64 {
    (db * 10.0).round() as i64
}

fn names(entries: Vec<ListEntry>) -> Vec<String> {
    entries.into_iter().map(|e| e.name).collect()
}

fn wrong_type(param: Param, value: &Value) -> LyngdorfError {
    LyngdorfError::InvalidArgument(format!("{} cannot be set to {:?}", param, value))
}

fn expect_bool(param: Param, value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| wrong_type(param, value))
}

fn expect_f64(param: Param, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| wrong_type(param, value))
}

fn expect_str<'a>(param: Param, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| wrong_type(param, value))
}
