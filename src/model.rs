//! Device models and their capability sets
//!
//! A client starts with the generic capability set, which only knows enough
//! to ask the processor what it is. Once the model is known the matching
//! family table is fixed for the lifetime of the client.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LyngdorfError, Result};
use crate::protocol::commands::{
    common_command, mp_command, tdai_command, Command, CommandTemplate, Query, QuerySpec,
    COMMON_QUERIES, MP_QUERIES, TDAI_QUERIES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceModel {
    #[serde(rename = "MP-40")]
    Mp40,
    #[serde(rename = "MP-50")]
    Mp50,
    #[serde(rename = "MP-60")]
    Mp60,
    #[serde(rename = "TDAI-1120")]
    Tdai1120,
    #[serde(rename = "TDAI-2210")]
    Tdai2210,
    #[serde(rename = "TDAI-3400")]
    Tdai3400,
}

impl DeviceModel {
    pub const ALL: &'static [DeviceModel] = &[
        DeviceModel::Mp40,
        DeviceModel::Mp50,
        DeviceModel::Mp60,
        DeviceModel::Tdai1120,
        DeviceModel::Tdai2210,
        DeviceModel::Tdai3400,
    ];

    /// Name as reported by `DEVICE?`
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceModel::Mp40 => "MP-40",
            DeviceModel::Mp50 => "MP-50",
            DeviceModel::Mp60 => "MP-60",
            DeviceModel::Tdai1120 => "TDAI-1120",
            DeviceModel::Tdai2210 => "TDAI-2210",
            DeviceModel::Tdai3400 => "TDAI-3400",
        }
    }

    pub fn family(self) -> Family {
        match self {
            DeviceModel::Mp40 | DeviceModel::Mp50 | DeviceModel::Mp60 => Family::Mp,
            DeviceModel::Tdai1120 | DeviceModel::Tdai2210 | DeviceModel::Tdai3400 => Family::Tdai,
        }
    }

    pub fn capabilities(self) -> &'static Capabilities {
        match self {
            DeviceModel::Mp40 | DeviceModel::Mp50 | DeviceModel::Mp60 => &MP,
            DeviceModel::Tdai1120 | DeviceModel::Tdai2210 => &TDAI_1120_2210,
            DeviceModel::Tdai3400 => &TDAI_3400,
        }
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceModel {
    type Err = LyngdorfError;

    fn from_str(s: &str) -> Result<Self> {
        DeviceModel::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| LyngdorfError::Unsupported(format!("device model {}", s)))
    }
}

/// Protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Family {
    /// Model not yet known; common commands only
    Generic,
    Mp,
    Tdai,
}

/// Code-to-description table, e.g. stream type 2 is "Spotify"
pub type LookupTable = &'static [(i64, &'static str)];

/// Static description of what a processor family understands
#[derive(Debug)]
pub struct Capabilities {
    pub family: Family,
    pub multichannel: bool,
    commands: fn(Command) -> Option<CommandTemplate>,
    queries: &'static [QuerySpec],
    pub stream_types: LookupTable,
    pub audio_inputs: LookupTable,
    pub video_inputs: LookupTable,
    pub video_outputs: LookupTable,
}

impl Capabilities {
    pub fn command(&self, command: Command) -> Option<CommandTemplate> {
        (self.commands)(command)
    }

    /// Render a command, failing if this family does not know it.
    pub fn render(&self, command: Command, arg: Option<i64>) -> Result<String> {
        self.command(command)
            .ok_or_else(|| {
                LyngdorfError::Unsupported(format!("{} on {:?} processors", command, self.family))
            })?
            .render(arg)
    }

    pub fn supports(&self, command: Command) -> bool {
        self.command(command).is_some()
    }

    pub fn queries(&self) -> &'static [QuerySpec] {
        self.queries
    }

    pub fn query(&self, query: Query) -> Option<&'static QuerySpec> {
        self.queries.iter().find(|spec| spec.query == query)
    }
}

/// Look up a numeric code carried as text; unknown or unparseable codes give `None`.
pub fn lookup_description(code: &str, table: LookupTable) -> Option<&'static str> {
    let code: i64 = code.trim().parse().ok()?;
    table
        .iter()
        .find_map(|(key, desc)| (*key == code).then_some(*desc))
}

pub static GENERIC: Capabilities = Capabilities {
    family: Family::Generic,
    multichannel: false,
    commands: common_command,
    queries: COMMON_QUERIES,
    stream_types: &[],
    audio_inputs: &[],
    video_inputs: &[],
    video_outputs: &[],
};

pub static MP: Capabilities = Capabilities {
    family: Family::Mp,
    multichannel: true,
    commands: mp_command,
    queries: MP_QUERIES,
    stream_types: MP_STREAM_TYPES,
    audio_inputs: MP_AUDIO_INPUTS,
    video_inputs: MP_VIDEO_INPUTS,
    video_outputs: MP_VIDEO_OUTPUTS,
};

pub static TDAI_1120_2210: Capabilities = Capabilities {
    family: Family::Tdai,
    multichannel: false,
    commands: tdai_command,
    queries: TDAI_QUERIES,
    stream_types: TDAI_1120_STREAM_TYPES,
    audio_inputs: &[],
    video_inputs: &[],
    video_outputs: &[],
};

pub static TDAI_3400: Capabilities = Capabilities {
    family: Family::Tdai,
    multichannel: false,
    commands: tdai_command,
    queries: TDAI_QUERIES,
    stream_types: TDAI_3400_STREAM_TYPES,
    audio_inputs: &[],
    video_inputs: &[],
    video_outputs: &[],
};

// Code 0 means "nothing" on every table and is left out.

const MP_STREAM_TYPES: LookupTable = &[
    (1, "vTuner"),
    (2, "Spotify"),
    (3, "AirPlay"),
    (4, "UPnP"),
    (5, "Storage"),
    (6, "Roon ready"),
    (7, "TIDAL"),
    (8, "airable"),
    (9, "Artist Connection"),
    (10, "Qobuz"),
];

const TDAI_1120_STREAM_TYPES: LookupTable = &[
    (1, "vTuner"),
    (2, "Spotify"),
    (3, "Airplay"),
    (4, "uPnP"),
    (5, "USB File"),
    (6, "Roon Ready"),
    (7, "Bluetooth"),
    (8, "GoogleCast"),
    (9, "TIDAL"),
    (10, "airable"),
    (11, "Qobuz"),
];

const TDAI_3400_STREAM_TYPES: LookupTable = &[
    (1, "vTuner"),
    (2, "Spotify"),
    (3, "Airplay"),
    (4, "uPnP"),
    (5, "USB File"),
    (6, "Roon Ready"),
    (7, "Bluetooth"),
    (8, "TIDAL"),
    (9, "airable"),
    (10, "Qobuz"),
];

const MP_AUDIO_INPUTS: LookupTable = &[
    (1, "HDMI"),
    (3, "Spdif 1 (Opt.)"),
    (4, "Spdif 2 (Opt.)"),
    (5, "Spdif 3 (Opt.)"),
    (6, "Spdif 4 (Opt.)"),
    (7, "Spdif 5 (AES)"),
    (8, "Spdif 6 (Coax)"),
    (9, "Spdif 7 (Coax)"),
    (10, "Spdif 8 (Coax)"),
    (11, "Internal Player"),
    (12, "USB"),
    (20, "16-Channel (AES module)"),
    (21, "16-Channel 2.0 (AES module)"),
    (22, "16-Channel 5.1 (AES module)"),
    (23, "16-Channel 7.1 (AES module)"),
    (24, "Audio Return Channel"),
    (35, "vTuner"),
    (36, "TIDAL"),
    (37, "Spotify"),
    (38, "AirPlay"),
    (39, "Roon Ready"),
    (40, "DLNA"),
    (41, "Storage"),
    (42, "airable"),
    (43, "Artist Connection"),
    (44, "Qobuz"),
];

const MP_VIDEO_INPUTS: LookupTable = &[
    (1, "HDMI 1"),
    (2, "HDMI 2"),
    (3, "HDMI 3"),
    (4, "HDMI 4"),
    (5, "HDMI 5"),
    (6, "HDMI 6"),
    (7, "HDMI 7"),
    (8, "HDMI 8"),
    (9, "Internal"),
];

const MP_VIDEO_OUTPUTS: LookupTable = &[(1, "HDMI Out 1"), (2, "HDMI Out 2"), (3, "HDBT Out")];
