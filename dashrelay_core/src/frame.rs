use std::fmt::{Display, Formatter};
use std::mem::{offset_of, size_of};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Number of object slots in shared record.
pub const MAX_OBJECTS: usize = 30;
/// Object kind written by the game into unused slots.
pub const EMPTY_OBJECT_KIND: i32 = -1;
/// Horizontal distance written by the game into unused slots.
pub const EMPTY_OBJECT_DX: f32 = 9999.0;

/// Single object slot, exactly as laid out by the game process.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ObjectRecord{
    pub dx: f32,
    pub dy: f32,
    pub width: f32,
    pub height: f32,
    pub kind: i32,
}

impl ObjectRecord{
    pub fn empty() -> Self{
        Self{dx: EMPTY_OBJECT_DX, dy: 0.0, width: 0.0, height: 0.0, kind: EMPTY_OBJECT_KIND}
    }
}

/// Record shared with the game. Every field is a 32 bit word, field order and size must
/// match the peer byte for byte. There is no version field.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SharedRecord{
    /// Set by game while it writes a frame.
    pub host_writing: i32,
    /// Set by trainer between reading frame and writing action.
    pub trainer_reading: i32,

    pub player_x: f32,
    pub player_y: f32,
    pub player_vel_x: f32,
    pub player_vel_y: f32,
    pub player_rotation: f32,
    pub gravity: i32,
    pub on_ground: i32,
    pub dead: i32,
    pub terminal: i32,

    pub percent: f32,
    pub hazard_distance: f32,
    pub solid_distance: f32,
    pub player_mode: i32,
    pub player_speed: f32,

    pub objects: [ObjectRecord; MAX_OBJECTS],

    pub action_command: i32,
    pub reset_command: i32,
    pub checkpoint_command: i32,
}

/// Byte offsets of fields in [`SharedRecord`].
pub mod layout{
    use super::*;

    pub const HOST_WRITING: usize = offset_of!(SharedRecord, host_writing);
    pub const TRAINER_READING: usize = offset_of!(SharedRecord, trainer_reading);
    pub const PERCENT: usize = offset_of!(SharedRecord, percent);
    pub const OBJECTS: usize = offset_of!(SharedRecord, objects);
    pub const ACTION_COMMAND: usize = offset_of!(SharedRecord, action_command);
    pub const RESET_COMMAND: usize = offset_of!(SharedRecord, reset_command);
    pub const CHECKPOINT_COMMAND: usize = offset_of!(SharedRecord, checkpoint_command);

    /// Total size of record in bytes.
    pub const RECORD_SIZE: usize = size_of::<SharedRecord>();
    /// Number of 32 bit words in record.
    pub const RECORD_WORDS: usize = RECORD_SIZE / 4;

    const _: () = assert!(RECORD_SIZE == 676);
    const _: () = assert!(OBJECTS == 64);
    const _: () = assert!(ACTION_COMMAND == 664);
    const _: () = assert!(CHECKPOINT_COMMAND == 672);
}

/// Vehicle the player currently controls. Game writes `0` for ground (cube) and `1` for flight (ship).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ModeRepr", into = "ModeRepr")]
pub enum PlayerMode{
    #[default]
    Ground,
    Flight,
}

impl PlayerMode{
    /// Unknown codes are treated as ground mode.
    pub fn from_code(code: i32) -> Self{
        match code{
            1 => PlayerMode::Flight,
            _ => PlayerMode::Ground
        }
    }
    pub fn code(&self) -> i32{
        match self{
            PlayerMode::Ground => 0,
            PlayerMode::Flight => 1
        }
    }
}

impl Display for PlayerMode{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self{
            PlayerMode::Ground => write!(f, "ground"),
            PlayerMode::Flight => write!(f, "flight"),
        }
    }
}

/// Accepted spellings of mode in definition files.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ModeRepr{
    Code(i32),
    Name(String),
}

impl TryFrom<ModeRepr> for PlayerMode{
    type Error = String;

    fn try_from(value: ModeRepr) -> Result<Self, Self::Error> {
        match value{
            ModeRepr::Code(0) => Ok(PlayerMode::Ground),
            ModeRepr::Code(1) => Ok(PlayerMode::Flight),
            ModeRepr::Code(n) => Err(format!("unknown player mode code {n}")),
            ModeRepr::Name(s) => match s.to_lowercase().as_str(){
                "ground" | "cube" => Ok(PlayerMode::Ground),
                "flight" | "ship" => Ok(PlayerMode::Flight),
                other => Err(format!("unknown player mode name \"{other}\""))
            }
        }
    }
}

impl From<PlayerMode> for ModeRepr{
    fn from(value: PlayerMode) -> Self {
        ModeRepr::Code(value.code())
    }
}

/// Command sent to the game each step.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action{
    #[default]
    Release,
    Hold,
}

impl Action{
    pub const COUNT: usize = 2;

    pub fn index(&self) -> usize{
        match self{
            Action::Release => 0,
            Action::Hold => 1
        }
    }
    pub fn from_index(index: usize) -> Option<Self>{
        match index{
            0 => Some(Action::Release),
            1 => Some(Action::Hold),
            _ => None
        }
    }
    pub fn is_active(&self) -> bool{
        matches!(self, Action::Hold)
    }
}

impl Display for Action{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self{
            Action::Release => write!(f, "Release"),
            Action::Hold => write!(f, "Hold")
        }
    }
}

/// Object near the player, relative to its bounding box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NearbyObject{
    pub dx: f32,
    pub dy: f32,
    pub width: f32,
    pub height: f32,
    pub kind: i32,
}

impl NearbyObject{
    pub fn is_present(&self) -> bool{
        self.kind >= 0
    }
}

/// Decoded frame published by game.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RawFrame{
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub rotation: f32,
    pub gravity: i32,
    pub on_ground: bool,
    pub dead: bool,
    pub terminal: bool,
    pub percent: f32,
    pub hazard_distance: f32,
    pub solid_distance: f32,
    pub mode: PlayerMode,
    pub speed: f32,
    pub objects: [NearbyObject; MAX_OBJECTS],
}

#[inline]
fn finite(v: f32) -> f32{
    if v.is_finite() { v } else { 0.0 }
}

impl RawFrame{

    /// Decodes record, replacing NaN and infinities with `0.0`.
    pub fn from_record(record: &SharedRecord) -> Self{
        let objects = record.objects.map(|o| NearbyObject{
            dx: finite(o.dx),
            dy: finite(o.dy),
            width: finite(o.width),
            height: finite(o.height),
            kind: o.kind,
        });
        Self{
            x: finite(record.player_x),
            y: finite(record.player_y),
            vel_x: finite(record.player_vel_x),
            vel_y: finite(record.player_vel_y),
            rotation: finite(record.player_rotation),
            gravity: record.gravity,
            on_ground: record.on_ground != 0,
            dead: record.dead != 0,
            terminal: record.terminal != 0,
            percent: finite(record.percent),
            hazard_distance: finite(record.hazard_distance),
            solid_distance: finite(record.solid_distance),
            mode: PlayerMode::from_code(record.player_mode),
            speed: finite(record.player_speed),
            objects,
        }
    }

    pub fn visible_objects(&self) -> impl Iterator<Item = &NearbyObject>{
        self.objects.iter().filter(|o| o.is_present())
    }
}

#[cfg(test)]
mod tests{
    use bytemuck::Zeroable;
    use crate::frame::{layout, ObjectRecord, PlayerMode, RawFrame, SharedRecord, MAX_OBJECTS};

    #[test]
    fn layout_matches_peer(){
        assert_eq!(layout::RECORD_SIZE, 676);
        assert_eq!(layout::RECORD_WORDS, 169);
        assert_eq!(layout::TRAINER_READING, 4);
        assert_eq!(layout::PERCENT, 44);
        assert_eq!(layout::RESET_COMMAND, 668);
    }

    #[test]
    fn decoding_sanitizes_non_finite(){
        let mut record = SharedRecord::zeroed();
        record.percent = f32::NAN;
        record.player_vel_y = f32::INFINITY;
        record.hazard_distance = f32::NEG_INFINITY;
        record.player_mode = 1;
        record.dead = 1;
        record.objects = [ObjectRecord::empty(); MAX_OBJECTS];
        let frame = RawFrame::from_record(&record);
        assert_eq!(frame.percent, 0.0);
        assert_eq!(frame.vel_y, 0.0);
        assert_eq!(frame.hazard_distance, 0.0);
        assert_eq!(frame.mode, PlayerMode::Flight);
        assert!(frame.dead);
        assert_eq!(frame.visible_objects().count(), 0);
    }

    #[test]
    fn mode_parses_codes_and_names(){
        let modes: Vec<PlayerMode> = serde_json::from_str(r#"[0, 1, "cube", "ship", "Flight"]"#).unwrap();
        assert_eq!(modes, vec![PlayerMode::Ground, PlayerMode::Flight, PlayerMode::Ground, PlayerMode::Flight, PlayerMode::Flight]);
        assert!(serde_json::from_str::<PlayerMode>("7").is_err());
    }
}
