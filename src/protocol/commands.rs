//! Command and query tables
//!
//! Both processor families share a small common vocabulary (volume, mute,
//! source selection, transport keys). Everything else is spelled differently
//! on the MP and TDAI lines, so each family gets its own table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LyngdorfError, Result};

/// Operations a processor may accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Verbose,
    PowerOn,
    PowerOff,
    Volume,
    VolumeUp,
    VolumeDown,
    MuteOn,
    MuteOff,
    SourceButton,
    Source,
    SourceNext,
    SourcePrev,
    Voicing,
    VoicingNext,
    VoicingPrev,
    FocusPosition,
    FocusPositionNext,
    FocusPositionPrev,
    AudioModeButton,
    AudioMode,
    AudioModeNext,
    AudioModePrev,
    Lipsync,
    LipsyncUp,
    LipsyncDown,
    DtsDialogUp,
    DtsDialogDown,
    Play,
    Next,
    Previous,
    BassTrim,
    BassTrimUp,
    BassTrimDown,
    TrebleTrim,
    TrebleTrimUp,
    TrebleTrimDown,
    CenterTrim,
    CenterTrimUp,
    CenterTrimDown,
    HeightsTrim,
    HeightsTrimUp,
    HeightsTrimDown,
    LfeTrim,
    LfeTrimUp,
    LfeTrimDown,
    SurroundsTrim,
    SurroundsTrimUp,
    SurroundsTrimDown,
    CursorUp,
    CursorDown,
    CursorLeft,
    CursorRight,
    CursorEnter,
    Digit0,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,
    Menu,
    Info,
    Settings,
    Back,
}

impl Command {
    pub const ALL: &'static [Command] = &[
        Command::Verbose,
        Command::PowerOn,
        Command::PowerOff,
        Command::Volume,
        Command::VolumeUp,
        Command::VolumeDown,
        Command::MuteOn,
        Command::MuteOff,
        Command::SourceButton,
        Command::Source,
        Command::SourceNext,
        Command::SourcePrev,
        Command::Voicing,
        Command::VoicingNext,
        Command::VoicingPrev,
        Command::FocusPosition,
        Command::FocusPositionNext,
        Command::FocusPositionPrev,
        Command::AudioModeButton,
        Command::AudioMode,
        Command::AudioModeNext,
        Command::AudioModePrev,
        Command::Lipsync,
        Command::LipsyncUp,
        Command::LipsyncDown,
        Command::DtsDialogUp,
        Command::DtsDialogDown,
        Command::Play,
        Command::Next,
        Command::Previous,
        Command::BassTrim,
        Command::BassTrimUp,
        Command::BassTrimDown,
        Command::TrebleTrim,
        Command::TrebleTrimUp,
        Command::TrebleTrimDown,
        Command::CenterTrim,
        Command::CenterTrimUp,
        Command::CenterTrimDown,
        Command::HeightsTrim,
        Command::HeightsTrimUp,
        Command::HeightsTrimDown,
        Command::LfeTrim,
        Command::LfeTrimUp,
        Command::LfeTrimDown,
        Command::SurroundsTrim,
        Command::SurroundsTrimUp,
        Command::SurroundsTrimDown,
        Command::CursorUp,
        Command::CursorDown,
        Command::CursorLeft,
        Command::CursorRight,
        Command::CursorEnter,
        Command::Digit0,
        Command::Digit1,
        Command::Digit2,
        Command::Digit3,
        Command::Digit4,
        Command::Digit5,
        Command::Digit6,
        Command::Digit7,
        Command::Digit8,
        Command::Digit9,
        Command::Menu,
        Command::Info,
        Command::Settings,
        Command::Back,
    ];

    /// Whether the processor echoes this command back. Volume steps and the
    /// verbosity switch are sent without waiting for confirmation.
    pub fn awaits_echo(self) -> bool {
        !matches!(
            self,
            Command::Verbose | Command::VolumeUp | Command::VolumeDown
        )
    }

    /// Stable name used in config files and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Command::Verbose => "VERBOSE",
            Command::PowerOn => "POWER_ON",
            Command::PowerOff => "POWER_OFF",
            Command::Volume => "VOLUME",
            Command::VolumeUp => "VOLUME_UP",
            Command::VolumeDown => "VOLUME_DOWN",
            Command::MuteOn => "MUTE_ON",
            Command::MuteOff => "MUTE_OFF",
            Command::SourceButton => "SOURCE_BUTTON",
            Command::Source => "SOURCE",
            Command::SourceNext => "SOURCE_NEXT",
            Command::SourcePrev => "SOURCE_PREV",
            Command::Voicing => "VOICING",
            Command::VoicingNext => "VOICING_NEXT",
            Command::VoicingPrev => "VOICING_PREV",
            Command::FocusPosition => "FOCUS_POSITION",
            Command::FocusPositionNext => "FOCUS_POSITION_NEXT",
            Command::FocusPositionPrev => "FOCUS_POSITION_PREV",
            Command::AudioModeButton => "AUDIO_MODE_BUTTON",
            Command::AudioMode => "AUDIO_MODE",
            Command::AudioModeNext => "AUDIO_MODE_NEXT",
            Command::AudioModePrev => "AUDIO_MODE_PREV",
            Command::Lipsync => "LIPSYNC",
            Command::LipsyncUp => "LIPSYNC_UP",
            Command::LipsyncDown => "LIPSYNC_DOWN",
            Command::DtsDialogUp => "DTS_DIALOG_UP",
            Command::DtsDialogDown => "DTS_DIALOG_DOWN",
            Command::Play => "PLAY",
            Command::Next => "NEXT",
            Command::Previous => "PREVIOUS",
            Command::BassTrim => "BASS_TRIM",
            Command::BassTrimUp => "BASS_TRIM_UP",
            Command::BassTrimDown => "BASS_TRIM_DOWN",
            Command::TrebleTrim => "TREBLE_TRIM",
            Command::TrebleTrimUp => "TREBLE_TRIM_UP",
            Command::TrebleTrimDown => "TREBLE_TRIM_DOWN",
            Command::CenterTrim => "CENTER_TRIM",
            Command::CenterTrimUp => "CENTER_TRIM_UP",
            Command::CenterTrimDown => "CENTER_TRIM_DOWN",
            Command::HeightsTrim => "HEIGHTS_TRIM",
            Command::HeightsTrimUp => "HEIGHTS_TRIM_UP",
            Command::HeightsTrimDown => "HEIGHTS_TRIM_DOWN",
            Command::LfeTrim => "LFE_TRIM",
            Command::LfeTrimUp => "LFE_TRIM_UP",
            Command::LfeTrimDown => "LFE_TRIM_DOWN",
            Command::SurroundsTrim => "SURROUNDS_TRIM",
            Command::SurroundsTrimUp => "SURROUNDS_TRIM_UP",
            Command::SurroundsTrimDown => "SURROUNDS_TRIM_DOWN",
            Command::CursorUp => "CURSOR_UP",
            Command::CursorDown => "CURSOR_DOWN",
            Command::CursorLeft => "CURSOR_LEFT",
            Command::CursorRight => "CURSOR_RIGHT",
            Command::CursorEnter => "CURSOR_ENTER",
            Command::Digit0 => "DIGIT_0",
            Command::Digit1 => "DIGIT_1",
            Command::Digit2 => "DIGIT_2",
            Command::Digit3 => "DIGIT_3",
            Command::Digit4 => "DIGIT_4",
            Command::Digit5 => "DIGIT_5",
            Command::Digit6 => "DIGIT_6",
            Command::Digit7 => "DIGIT_7",
            Command::Digit8 => "DIGIT_8",
            Command::Digit9 => "DIGIT_9",
            Command::Menu => "MENU",
            Command::Info => "INFO",
            Command::Settings => "SETTINGS",
            Command::Back => "BACK",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = LyngdorfError;

    /// Case-insensitive; `volume_up` and `VOLUME_UP` are the same command.
    fn from_str(s: &str) -> Result<Self> {
        Command::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LyngdorfError::InvalidArgument(format!("unknown command: {}", s)))
    }
}

/// Wire template for one command; `{}` marks the integer argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTemplate {
    pub template: &'static str,
    pub takes_arg: bool,
}

impl CommandTemplate {
    const fn plain(template: &'static str) -> Self {
        Self {
            template,
            takes_arg: false,
        }
    }

    const fn with_arg(template: &'static str) -> Self {
        Self {
            template,
            takes_arg: true,
        }
    }

    /// Produce the command text, checking the argument against the template.
    pub fn render(&self, arg: Option<i64>) -> Result<String> {
        match (self.takes_arg, arg) {
            (true, Some(value)) => Ok(self.template.replacen("{}", &value.to_string(), 1)),
            (false, None) => Ok(self.template.to_string()),
            (true, None) => Err(LyngdorfError::InvalidArgument(format!(
                "{} requires an argument",
                self.template
            ))),
            (false, Some(_)) => Err(LyngdorfError::InvalidArgument(format!(
                "{} does not accept an argument",
                self.template
            ))),
        }
    }
}

pub(crate) fn common_command(command: Command) -> Option<CommandTemplate> {
    use CommandTemplate as T;
    let template = match command {
        Command::Verbose => T::with_arg("VERB({})"),
        Command::Volume => T::with_arg("VOL({})"),
        Command::MuteOn => T::plain("MUTEON"),
        Command::MuteOff => T::plain("MUTEOFF"),
        Command::Source => T::with_arg("SRC({})"),
        Command::Play => T::plain("PLAY"),
        Command::Previous => T::plain("PREV"),
        Command::Next => T::plain("NEXT"),
        _ => return None,
    };
    Some(template)
}

pub(crate) fn mp_command(command: Command) -> Option<CommandTemplate> {
    use CommandTemplate as T;
    let template = match command {
        Command::PowerOn => T::plain("POWERONMAIN"),
        Command::PowerOff => T::plain("POWEROFFMAIN"),
        Command::VolumeUp => T::plain("VOL+"),
        Command::VolumeDown => T::plain("VOL-"),
        Command::SourceButton => T::plain("SRCBTN"),
        Command::SourceNext => T::plain("SRC+"),
        Command::SourcePrev => T::plain("SRC-"),
        Command::Voicing => T::with_arg("RPVOI({})"),
        Command::VoicingNext => T::plain("RPVOI+"),
        Command::VoicingPrev => T::plain("RPVOI-"),
        Command::FocusPosition => T::with_arg("RPFOC({})"),
        Command::FocusPositionNext => T::plain("RPFOC+"),
        Command::FocusPositionPrev => T::plain("RPFOC-"),
        Command::AudioModeButton => T::plain("AUDIO"),
        Command::AudioMode => T::with_arg("AUDMODE({})"),
        Command::AudioModeNext => T::plain("AUDMODE+"),
        Command::AudioModePrev => T::plain("AUDMODE-"),
        Command::Lipsync => T::with_arg("LIPSYNC({})"),
        Command::LipsyncUp => T::plain("LIPSYNC+"),
        Command::LipsyncDown => T::plain("LIPSYNC-"),
        Command::DtsDialogUp => T::plain("DTSDIALOGUP"),
        Command::DtsDialogDown => T::plain("DTSDIALOGDN"),
        Command::BassTrim => T::with_arg("TRIMBASS({})"),
        Command::BassTrimUp => T::plain("TRIMBASS+"),
        Command::BassTrimDown => T::plain("TRIMBASS-"),
        Command::TrebleTrim => T::with_arg("TRIMTREB({})"),
        Command::TrebleTrimUp => T::plain("TRIMTREB+"),
        Command::TrebleTrimDown => T::plain("TRIMTREB-"),
        Command::CenterTrim => T::with_arg("TRIMCENTER({})"),
        Command::CenterTrimUp => T::plain("TRIMCENTER+"),
        Command::CenterTrimDown => T::plain("TRIMCENTER-"),
        Command::HeightsTrim => T::with_arg("TRIMHEIGHT({})"),
        Command::HeightsTrimUp => T::plain("TRIMHEIGHT+"),
        Command::HeightsTrimDown => T::plain("TRIMHEIGHT-"),
        Command::LfeTrim => T::with_arg("TRIMLFE({})"),
        Command::LfeTrimUp => T::plain("TRIMLFE+"),
        Command::LfeTrimDown => T::plain("TRIMLFE-"),
        Command::SurroundsTrim => T::with_arg("TRIMSURRS({})"),
        Command::SurroundsTrimUp => T::plain("TRIMSURRS+"),
        Command::SurroundsTrimDown => T::plain("TRIMSURRS-"),
        Command::CursorUp => T::plain("DIRU"),
        Command::CursorDown => T::plain("DIRD"),
        Command::CursorLeft => T::plain("DIRL"),
        Command::CursorRight => T::plain("DIRR"),
        Command::CursorEnter => T::plain("ENTER"),
        Command::Digit0 => T::plain("NUM(0)"),
        Command::Digit1 => T::plain("NUM(1)"),
        Command::Digit2 => T::plain("NUM(2)"),
        Command::Digit3 => T::plain("NUM(3)"),
        Command::Digit4 => T::plain("NUM(4)"),
        Command::Digit5 => T::plain("NUM(5)"),
        Command::Digit6 => T::plain("NUM(6)"),
        Command::Digit7 => T::plain("NUM(7)"),
        Command::Digit8 => T::plain("NUM(8)"),
        Command::Digit9 => T::plain("NUM(9)"),
        Command::Menu => T::plain("MENU"),
        Command::Info => T::plain("INFO"),
        Command::Settings => T::plain("SETUP"),
        Command::Back => T::plain("BACK"),
        other => return common_command(other),
    };
    Some(template)
}

pub(crate) fn tdai_command(command: Command) -> Option<CommandTemplate> {
    use CommandTemplate as T;
    let template = match command {
        Command::PowerOn => T::plain("ON"),
        Command::PowerOff => T::plain("OFF"),
        Command::VolumeUp => T::plain("VOLUP"),
        Command::VolumeDown => T::plain("VOLDN"),
        Command::SourceNext => T::plain("SRCUP"),
        Command::SourcePrev => T::plain("SRCDN"),
        Command::Voicing => T::with_arg("VOI({})"),
        Command::VoicingNext => T::plain("VOIUP"),
        Command::VoicingPrev => T::plain("VOIDN"),
        Command::FocusPosition => T::with_arg("RP({})"),
        Command::FocusPositionNext => T::plain("RPUP"),
        Command::FocusPositionPrev => T::plain("RPDN"),
        other => return common_command(other),
    };
    Some(template)
}

/// State reads a processor may answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Query {
    Verbose,
    Device,
    Power,
    Volume,
    Mute,
    SourceList,
    Source,
    StreamType,
    VoicingList,
    Voicing,
    FocusPositionList,
    FocusPosition,
    AudioModeList,
    AudioMode,
    MaxVolume,
    AudioInput,
    AudioType,
    VideoInput,
    VideoType,
    VideoOutput,
    LipsyncRange,
    Lipsync,
    DtsDialogAvailable,
    DtsDialog,
    Loudness,
    BassTrim,
    TrebleTrim,
    CenterTrim,
    HeightsTrim,
    LfeTrim,
    SurroundsTrim,
}

/// Wire text of a query and the status names that answer it.
///
/// List queries are answered first by their count line; the entries follow
/// as ordinary notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySpec {
    pub query: Query,
    pub text: &'static str,
    pub replies: &'static [&'static str],
}

const fn q(query: Query, text: &'static str, replies: &'static [&'static str]) -> QuerySpec {
    QuerySpec {
        query,
        text,
        replies,
    }
}

pub(crate) static COMMON_QUERIES: &[QuerySpec] = &[
    q(Query::Verbose, "VERB?", &["VERB"]),
    q(Query::Device, "DEVICE?", &["DEVICE"]),
];

pub(crate) static MP_QUERIES: &[QuerySpec] = &[
    q(Query::Verbose, "VERB?", &["VERB"]),
    q(Query::Device, "DEVICE?", &["DEVICE"]),
    q(Query::Power, "POWER?", &["POWER"]),
    q(Query::MaxVolume, "MAXVOL?", &["MAXVOL"]),
    q(Query::Volume, "VOL?", &["VOL"]),
    q(Query::Mute, "MUTE?", &["MUTE", "MUTEON", "MUTEOFF"]),
    q(Query::SourceList, "SRCS?", &["SRCCOUNT"]),
    q(Query::Source, "SRC?", &["SRC"]),
    q(Query::StreamType, "STREAMTYPE?", &["STREAMTYPE"]),
    q(Query::VoicingList, "RPVOIS?", &["RPVOICOUNT"]),
    q(Query::Voicing, "RPVOI?", &["RPVOI"]),
    q(Query::FocusPositionList, "RPFOCS?", &["RPFOCCOUNT"]),
    q(Query::FocusPosition, "RPFOC?", &["RPFOC"]),
    q(Query::AudioModeList, "AUDMODEL?", &["AUDMODECOUNT"]),
    q(Query::AudioMode, "AUDMODE?", &["AUDMODE"]),
    q(Query::AudioInput, "AUDIN?", &["AUDIN"]),
    q(Query::AudioType, "AUDTYPE?", &["AUDTYPE"]),
    q(Query::VideoInput, "VIDIN?", &["VIDIN"]),
    q(Query::VideoType, "VIDTYPE?", &["VIDTYPE"]),
    q(Query::VideoOutput, "HDMIMAINOUT?", &["HDMIMAINOUT"]),
    q(Query::LipsyncRange, "LIPSYNCRANGE?", &["LIPSYNCRANGE"]),
    q(Query::Lipsync, "LIPSYNC?", &["LIPSYNC"]),
    q(Query::DtsDialogAvailable, "DTSDIALOGAVAILABLE?", &["DTSDIALOGAVAILABLE"]),
    q(Query::DtsDialog, "DTSDIALOG?", &["DTSDIALOG"]),
    q(Query::Loudness, "LOUDNESS?", &["LOUDNESS"]),
    q(Query::BassTrim, "TRIMBASS?", &["TRIMBASS"]),
    q(Query::TrebleTrim, "TRIMTREB?", &["TRIMTREB", "TRIMTREBLE"]),
    q(Query::CenterTrim, "TRIMCENTER?", &["TRIMCENTER"]),
    q(Query::HeightsTrim, "TRIMHEIGHT?", &["TRIMHEIGHT"]),
    q(Query::LfeTrim, "TRIMLFE?", &["TRIMLFE"]),
    q(Query::SurroundsTrim, "TRIMSURRS?", &["TRIMSURRS"]),
];

pub(crate) static TDAI_QUERIES: &[QuerySpec] = &[
    q(Query::Verbose, "VERB?", &["VERB"]),
    q(Query::Device, "DEVICE?", &["DEVICE"]),
    q(Query::Power, "PWR?", &["PWR"]),
    q(Query::Volume, "VOL?", &["VOL"]),
    q(Query::Mute, "MUTE?", &["MUTE", "MUTEON", "MUTEOFF"]),
    q(Query::SourceList, "SRCLIST?", &["SRCCOUNT"]),
    q(Query::Source, "SRCNAME?", &["SRCNAME", "SRC"]),
    q(Query::StreamType, "STREAMTYPE?", &["STREAMTYPE"]),
    q(Query::AudioType, "AUDIOSTATUS?", &["AUDIOSTATUS"]),
    q(Query::VoicingList, "VOILIST?", &["VOICOUNT"]),
    q(Query::Voicing, "VOINAME?", &["VOINAME", "VOI"]),
    q(Query::FocusPositionList, "RPLIST?", &["RPCOUNT"]),
    q(Query::FocusPosition, "RPNAME?", &["RPNAME", "RP"]),
];
