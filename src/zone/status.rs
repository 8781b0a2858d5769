//! Normalized player snapshot shared by every backend.
//!
//! Backends push partial updates; the zone manager keeps the last known value
//! per field. Wire encoding follows what the miniserver expects: `mode` and
//! `power` as strings, `audiotype`/`plrepeat` numeric, `plshuffle` as `0|1`.

use serde::{Deserialize, Serialize};

/// Playback mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerMode {
    Play,
    #[default]
    Pause,
    Stop,
    Resume,
}

impl PlayerMode {
    /// Map a vendor state string to the wire mode.
    pub fn from_vendor(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "play" | "playing" => Self::Play,
            "stop" | "stopped" | "idle" => Self::Stop,
            "resume" => Self::Resume,
            _ => Self::Pause,
        }
    }
}

/// Device power state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    #[default]
    On,
    Off,
    Starting,
    Updating,
    Rebooting,
    Offline,
}

/// Audio source class, numeric on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AudioType {
    #[default]
    File = 0,
    Radio = 1,
    Playlist = 2,
    LineIn = 3,
    Airplay = 4,
    Spotify = 5,
    Bluetooth = 6,
    Soundsuit = 7,
}

impl From<AudioType> for u8 {
    fn from(v: AudioType) -> Self {
        v as u8
    }
}

impl TryFrom<u8> for AudioType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Self::File,
            1 => Self::Radio,
            2 => Self::Playlist,
            3 => Self::LineIn,
            4 => Self::Airplay,
            5 => Self::Spotify,
            6 => Self::Bluetooth,
            7 => Self::Soundsuit,
            other => return Err(format!("unknown audiotype {other}")),
        })
    }
}

impl AudioType {
    /// Derive the audio type from the URI scheme or provider hints carried
    /// in a canonical id / audiopath.
    pub fn from_path(path: &str) -> Self {
        let p = path.trim().to_ascii_lowercase();
        if p.starts_with("radio:") || p.contains("tunein:") {
            Self::Radio
        } else if p.starts_with("playlist:") {
            Self::Playlist
        } else if p.starts_with("linein") || p.starts_with("aux") {
            Self::LineIn
        } else if p.starts_with("airplay") {
            Self::Airplay
        } else if p.contains("spotify") {
            Self::Spotify
        } else if p.starts_with("bluetooth") {
            Self::Bluetooth
        } else if p.contains("soundsuit") {
            Self::Soundsuit
        } else {
            Self::File
        }
    }
}

/// Repeat mode, numeric on the wire: none=0, queue=1, track=3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RepeatMode {
    #[default]
    None = 0,
    Queue = 1,
    Track = 3,
}

impl From<RepeatMode> for u8 {
    fn from(v: RepeatMode) -> Self {
        v as u8
    }
}

impl TryFrom<u8> for RepeatMode {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Self::None,
            1 => Self::Queue,
            3 => Self::Track,
            other => return Err(format!("unknown repeat mode {other}")),
        })
    }
}

impl RepeatMode {
    /// Lenient coercion from the many spellings the command surface accepts.
    /// Unknown values map to `None`.
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "all" | "queue" | "playlist" | "true" | "yes" => Self::Queue,
            "2" | "3" | "one" | "track" | "single" => Self::Track,
            _ => Self::None,
        }
    }
}

/// `plshuffle` is boolean on the internal model but numeric (`0|1`) on the
/// wire; the miniserver has been observed sending both spellings back.
pub(crate) mod shuffle_flag {
    use serde::de::{self, Deserializer, Unexpected};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(v: &Option<bool>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(b) => s.serialize_u8(u8::from(*b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = Option<bool>;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a boolean, 0/1, or null")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(Some(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                match v {
                    0 => Ok(Some(false)),
                    1 => Ok(Some(true)),
                    other => Err(E::invalid_value(
                        Unexpected::Unsigned(other),
                        &"0 or 1",
                    )),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                self.visit_u64(v.unsigned_abs())
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(None)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(None)
            }
        }

        d.deserialize_any(Visitor)
    }
}

/// The normalized player snapshot. Every field except `playerid` is optional
/// so the same type doubles as a partial update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub playerid: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<PlayerMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audiotype: Option<AudioType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plrepeat: Option<RepeatMode>,
    #[serde(
        default,
        with = "shuffle_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub plshuffle: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverurl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audiopath: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub qindex: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qid: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syncedzones: Option<Vec<u32>>,

    // Volume-policy fields the miniserver UI surfaces per zone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarmvolume: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttsvolume: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxvolume: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaultvolume: Option<i32>,
}

impl PlayerStatus {
    pub fn new(playerid: u32) -> Self {
        Self {
            playerid,
            ..Self::default()
        }
    }

    /// Steady status for a zone without a configured backend.
    pub fn unconfigured(playerid: u32) -> Self {
        Self {
            playerid,
            mode: Some(PlayerMode::Pause),
            power: Some(PowerState::On),
            title: Some("Unconfigured".to_string()),
            artist: Some(String::new()),
            album: Some(String::new()),
            volume: Some(0),
            time: Some(0.0),
            duration: Some(0.0),
            ..Self::default()
        }
    }

    /// Status flip applied when the backend's transport drops.
    pub fn offline(playerid: u32) -> Self {
        Self {
            playerid,
            power: Some(PowerState::Offline),
            mode: Some(PlayerMode::Pause),
            ..Self::default()
        }
    }

    /// Field-by-field copy-if-present merge of a partial update.
    pub fn merge(&mut self, update: &PlayerStatus) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if update.$field.is_some() {
                    self.$field = update.$field.clone();
                })*
            };
        }
        take!(
            mode, power, audiotype, plrepeat, plshuffle, volume, duration, time,
            position_ms, duration_ms, title, artist, album, coverurl, station,
            audiopath, qindex, qid, players, syncedzones, alarmvolume, ttsvolume,
            maxvolume, defaultvolume,
        );
    }

    /// Clamp and set the volume.
    pub fn set_volume(&mut self, volume: i32) {
        self.volume = Some(volume.clamp(0, 100));
    }
}
