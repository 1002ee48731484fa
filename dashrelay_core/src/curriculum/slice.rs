use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::CurriculumError;
use crate::frame::PlayerMode;

/// Contiguous range of level progress trained as one curriculum stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slice{
    pub id: u32,
    pub start: f32,
    pub end: f32,
    pub mode: PlayerMode,
    #[serde(default)]
    pub description: String,
}

impl Slice{
    pub fn new(id: u32, start: f32, end: f32, mode: PlayerMode) -> Self{
        Self{id, start, end, mode, description: String::new()}
    }

    /// Half open membership `start <= percent < end`.
    pub fn contains(&self, percent: f32) -> bool{
        self.start <= percent && percent < self.end
    }
}

/// Validated, ordered list of slices.
///
/// Guarantees:
/// + at least one slice,
/// + slices sorted by start, not overlapping, each with `start < end`,
/// + ids are `1..=N` in order.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceSet{
    slices: Vec<Slice>,
}

impl SliceSet{
    /// Sorts slices by start and validates them.
    pub fn new(mut slices: Vec<Slice>) -> Result<Self, CurriculumError>{
        if slices.is_empty(){
            return Err(CurriculumError::InvalidSlices {reason: "slice list is empty".into()})
        }
        if let Some(s) = slices.iter().find(|s| !(s.start.is_finite() && s.end.is_finite() && s.start < s.end)){
            return Err(CurriculumError::InvalidSlices {
                reason: format!("slice {} has invalid range [{}, {})", s.id, s.start, s.end)})
        }
        slices.sort_by(|a, b| a.start.total_cmp(&b.start));
        for (i, s) in slices.iter().enumerate(){
            let expected = i as u32 + 1;
            if s.id != expected{
                return Err(CurriculumError::InvalidSlices {
                    reason: format!("slice at position {} has id {}, expected {}", i, s.id, expected)})
            }
        }
        for w in slices.windows(2){
            if w[1].start < w[0].end{
                return Err(CurriculumError::InvalidSlices {
                    reason: format!("slices {} and {} overlap", w[0].id, w[1].id)})
            }
        }
        Ok(Self{slices})
    }

    /// Reads JSON array of slice records.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CurriculumError>{
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| CurriculumError::DefinitionUnreadable {path: path.to_path_buf(), source: e})?;
        let slices: Vec<Slice> = serde_json::from_str(&text)
            .map_err(|e| CurriculumError::DefinitionMalformed {path: path.to_path_buf(), source: e})?;
        Self::new(slices)
    }

    pub fn len(&self) -> usize{
        self.slices.len()
    }

    /// Always false, set is validated to be non-empty.
    pub fn is_empty(&self) -> bool{
        self.slices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Slice>{
        self.slices.get(index)
    }

    pub fn by_id(&self, id: u32) -> Option<&Slice>{
        self.slices.iter().find(|s| s.id == id)
    }

    pub fn as_slice(&self) -> &[Slice]{
        &self.slices
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slice>{
        self.slices.iter()
    }

    /// Slice containing `percent`. Last slice includes its end.
    pub fn slice_at(&self, percent: f32) -> Option<&Slice>{
        if let Some(s) = self.slices.iter().find(|s| s.contains(percent)){
            return Some(s)
        }
        self.slices.last().filter(|last| percent == last.end)
    }

    /// Most recent slice before `id` with the same mode.
    pub fn previous_with_mode(&self, id: u32, mode: PlayerMode) -> Option<&Slice>{
        self.slices.iter().rev().find(|s| s.id < id && s.mode == mode)
    }
}
