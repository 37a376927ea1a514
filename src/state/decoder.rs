//! Status line to state mapping
//!
//! A `Decoder` lives inside the listener task for one connection. It keeps
//! the partially filled indexed lists and the current volume curve, and turns
//! each status line into zero or more parameter updates.

use crate::error::{LyngdorfError, Result};
use crate::model::{lookup_description, Capabilities, LookupTable};
use crate::protocol::Message;

use super::lists::{IndexedList, ListUpdate};
use super::volume::VolumeCurve;
use super::{Param, Value};

/// New value for a parameter; `None` means the parameter is now unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub param: Param,
    pub value: Option<Value>,
}

impl Update {
    fn set(param: Param, value: Value) -> Self {
        Self {
            param,
            value: Some(value),
        }
    }

    fn unset(param: Param) -> Self {
        Self { param, value: None }
    }

    fn maybe(param: Param, value: Option<Value>) -> Self {
        Self { param, value }
    }
}

#[derive(Debug, Default)]
pub struct Decoder {
    sources: IndexedList,
    voicings: IndexedList,
    focus_positions: IndexedList,
    audio_modes: IndexedList,
    curve: VolumeCurve,
    volume: Option<f64>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one status line. Echo lines produce no updates.
    pub fn decode(&mut self, msg: &Message, caps: &Capabilities) -> Result<Vec<Update>> {
        if !msg.is_status() {
            return Ok(Vec::new());
        }
        let first = msg.param(0);

        let updates = match msg.name.as_str() {
            "DEVICE" => vec![Update::maybe(Param::Model, first.map(text))],
            "POWER" | "PWR" => vec![Update::maybe(Param::Power, first.and_then(on_off))],
            "VOL" => self.volume(first)?,
            "MUTE" | "MUTEON" | "MUTEOFF" => {
                let raw = first.unwrap_or_else(|| msg.name.get(4..).unwrap_or_default());
                vec![Update::maybe(Param::Mute, on_off(raw))]
            }
            "MAXVOL" => self.max_volume(first)?,
            "SRCCOUNT" => reset_list(&mut self.sources, first, Param::SourceList)?,
            "SRC" | "SRCNAME" => indexed(&mut self.sources, msg, Param::SourceList, Param::Source)?,
            "STREAMTYPE" => vec![lookup(Param::StreamType, first, caps.stream_types)],
            "RPVOICOUNT" | "VOICOUNT" => reset_list(&mut self.voicings, first, Param::VoicingList)?,
            "RPVOI" | "VOINAME" | "VOI" => {
                indexed(&mut self.voicings, msg, Param::VoicingList, Param::Voicing)?
            }
            "RPFOCCOUNT" | "RPCOUNT" => {
                reset_list(&mut self.focus_positions, first, Param::FocusPositionList)?
            }
            "RPFOC" | "RPNAME" | "RP" => indexed(
                &mut self.focus_positions,
                msg,
                Param::FocusPositionList,
                Param::FocusPosition,
            )?,
            "AUDMODECOUNT" => reset_list(&mut self.audio_modes, first, Param::AudioModeList)?,
            "AUDMODE" => indexed(&mut self.audio_modes, msg, Param::AudioModeList, Param::AudioMode)?,
            "AUDIOSTATUS" | "AUDTYPE" => {
                let joined = (!msg.params.is_empty()).then(|| Value::Text(msg.params.join(", ")));
                vec![Update::maybe(Param::AudioType, joined)]
            }
            "AUDIN" => vec![lookup(Param::AudioInput, first, caps.audio_inputs)],
            "VIDIN" => vec![lookup(Param::VideoInput, first, caps.video_inputs)],
            "VIDTYPE" => vec![Update::maybe(Param::VideoType, first.map(text))],
            "HDMIMAINOUT" => vec![lookup(Param::VideoOutput, first, caps.video_outputs)],
            "LIPSYNCRANGE" => match msg.params.as_slice() {
                [min, max] => vec![Update::set(
                    Param::LipsyncRange,
                    Value::Range {
                        min: integer(min)?,
                        max: integer(max)?,
                    },
                )],
                _ => Vec::new(),
            },
            "LIPSYNC" => vec![Update::maybe(
                Param::Lipsync,
                first.map(integer).transpose()?.map(Value::Integer),
            )],
            "DTSDIALOGAVAILABLE" => {
                vec![Update::maybe(Param::DtsDialogAvailable, first.and_then(on_off))]
            }
            "DTSDIALOG" => vec![tenths(Param::DtsDialog, first)?],
            "LOUDNESS" => vec![Update::maybe(Param::Loudness, first.and_then(on_off))],
            "TRIMBASS" => vec![tenths(Param::BassTrim, first)?],
            "TRIMTREB" | "TRIMTREBLE" => vec![tenths(Param::TrebleTrim, first)?],
            "TRIMCENTER" => vec![tenths(Param::CenterTrim, first)?],
            "TRIMHEIGHT" => vec![tenths(Param::HeightsTrim, first)?],
            "TRIMLFE" => vec![tenths(Param::LfeTrim, first)?],
            "TRIMSURRS" => vec![tenths(Param::SurroundsTrim, first)?],
            _ => Vec::new(),
        };
        Ok(updates)
    }

    pub fn curve(&self) -> VolumeCurve {
        self.curve
    }

    fn volume(&mut self, raw: Option<&str>) -> Result<Vec<Update>> {
        self.volume = raw.map(decibels).transpose()?;
        Ok(match self.volume {
            Some(db) => vec![
                Update::set(Param::Volume, Value::Number(db)),
                Update::set(Param::VolumeLevel, Value::Number(self.curve.db_to_level(db))),
            ],
            None => vec![Update::unset(Param::Volume), Update::unset(Param::VolumeLevel)],
        })
    }

    fn max_volume(&mut self, raw: Option<&str>) -> Result<Vec<Update>> {
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        let max_db = decibels(raw)?;
        self.curve = VolumeCurve::new(max_db);

        let mut updates = vec![Update::set(Param::MaxVolume, Value::Number(max_db))];
        if let Some(db) = self.volume {
            updates.push(Update::set(
                Param::VolumeLevel,
                Value::Number(self.curve.db_to_level(db)),
            ));
        }
        Ok(updates)
    }
}

fn reset_list(list: &mut IndexedList, raw: Option<&str>, list_param: Param) -> Result<Vec<Update>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let size = integer(raw)?;
    let size = usize::try_from(size)
        .map_err(|_| LyngdorfError::ProtocolError(format!("negative list size {}", size)))?;
    list.reset(size);
    Ok(vec![Update::unset(list_param)])
}

/// Entry line while the list is filling; selection line once it is full.
fn indexed(
    list: &mut IndexedList,
    msg: &Message,
    list_param: Param,
    current_param: Param,
) -> Result<Vec<Update>> {
    let Some(raw) = msg.param(0) else {
        return Ok(Vec::new());
    };
    let index = integer(raw)?;

    if list.is_full() {
        let current = list.name_of(index).map(text);
        return Ok(vec![Update::maybe(current_param, current)]);
    }

    let Some(name) = msg.param(1) else {
        return Ok(Vec::new());
    };
    Ok(match list.add(index, name) {
        ListUpdate::Completed => vec![Update::set(list_param, Value::List(list.entries().to_vec()))],
        ListUpdate::Added | ListUpdate::Ignored => Vec::new(),
    })
}

fn lookup(param: Param, raw: Option<&str>, table: LookupTable) -> Update {
    let value = raw
        .and_then(|code| lookup_description(code, table))
        .map(text);
    Update::maybe(param, value)
}

fn tenths(param: Param, raw: Option<&str>) -> Result<Update> {
    Ok(Update::maybe(
        param,
        raw.map(decibels).transpose()?.map(Value::Number),
    ))
}

fn text(raw: &str) -> Value {
    Value::Text(raw.to_string())
}

/// `1`/`ON` and `0`/`OFF`; anything else is unknown.
pub fn on_off(raw: &str) -> Option<Value> {
    match raw {
        "1" | "ON" => Some(Value::Bool(true)),
        "0" | "OFF" => Some(Value::Bool(false)),
        _ => None,
    }
}

/// Values in tenths of a dB, e.g. `-405` is -40.5 dB.
pub fn decibels(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|tenths| tenths.is_finite())
        .map(|tenths| tenths / 10.0)
        .ok_or_else(|| LyngdorfError::ProtocolError(format!("expected a number, got {:?}", raw)))
}

fn integer(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| LyngdorfError::ProtocolError(format!("expected an integer, got {:?}", raw)))
}
