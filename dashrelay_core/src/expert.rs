use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use nom::bytes::complete::tag;
use nom::character::complete::digit1;
use nom::combinator::{map_res, rest};
use nom::sequence::preceded;
use nom::{IResult, Parser};
use crate::agent::PolicyWeights;
use crate::error::ExpertError;

const EXPERTS_DIR: &str = "final_models";

/// File layout of checkpoint directory:
/// ```notrust
/// <root>/slice_01_current.<ext>              weights saved periodically while training slice 1
/// <root>/final_models/slice_01_model.<ext>   expert of slice 1, written once on promotion
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointLayout{
    root: PathBuf,
}

impl CheckpointLayout{
    pub fn new<P: AsRef<Path>>(root: P) -> Self{
        Self{root: root.as_ref().to_path_buf()}
    }

    pub fn root(&self) -> &Path{
        &self.root
    }

    pub fn current_path(&self, slice_id: u32, extension: &str) -> PathBuf{
        self.root.join(format!("slice_{slice_id:02}_current.{extension}"))
    }

    pub fn experts_dir(&self) -> PathBuf{
        self.root.join(EXPERTS_DIR)
    }

    pub fn expert_path(&self, slice_id: u32, extension: &str) -> PathBuf{
        self.experts_dir().join(format!("slice_{slice_id:02}_model.{extension}"))
    }
}

fn expert_file_name(input: &str) -> IResult<&str, (u32, &str)>{
    (
        preceded(tag("slice_"), map_res(digit1, |d: &str| d.parse::<u32>())),
        preceded(tag("_model."), rest),
    ).parse(input)
}

/// Parses `slice_<id>_model.<ext>` into id and extension.
pub fn parse_expert_file_name(name: &str) -> Option<(u32, &str)>{
    match expert_file_name(name){
        Ok((_, (id, ext))) if !ext.is_empty() => Some((id, ext)),
        _ => None
    }
}

/// In memory map of expert weights keyed by slice id.
///
/// Expert files are immutable: once written for a slice they are never overwritten.
#[derive(Debug)]
pub struct ExpertCache<W: PolicyWeights>{
    dir: PathBuf,
    experts: BTreeMap<u32, W>,
}

impl<W: PolicyWeights> ExpertCache<W>{

    /// Empty cache bound to experts directory of layout. Use [`load_all`](ExpertCache::load_all) to fill it.
    pub fn new(layout: &CheckpointLayout) -> Self{
        Self{dir: layout.experts_dir(), experts: BTreeMap::new()}
    }

    pub fn dir(&self) -> &Path{
        &self.dir
    }

    fn path_for(&self, slice_id: u32) -> PathBuf{
        self.dir.join(format!("slice_{slice_id:02}_model.{}", W::EXTENSION))
    }

    /// Replaces cache content with every readable expert found in directory.
    /// Unreadable or corrupt files are skipped. Returns number of loaded experts.
    pub fn load_all(&mut self) -> usize{
        self.experts.clear();
        let entries = match fs::read_dir(&self.dir){
            Ok(entries) => entries,
            Err(_e) => {
                #[cfg(feature = "log_debug")]
                log::debug!("No experts directory {:?} ({})", self.dir, _e);
                return 0;
            }
        };
        for entry in entries.flatten(){
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()){
                Some(n) => n,
                None => continue
            };
            let id = match parse_expert_file_name(name){
                Some((id, ext)) if ext == W::EXTENSION => id,
                _ => continue
            };
            match W::load_from(&path){
                Ok(weights) => {
                    #[cfg(feature = "log_info")]
                    log::info!("Loaded expert of slice {} from {:?}", id, path);
                    self.experts.insert(id, weights);
                },
                Err(_e) => {
                    #[cfg(feature = "log_warn")]
                    log::warn!("Skipping expert file {:?}: {}", path, _e);
                }
            }
        }
        self.experts.len()
    }

    /// Writes expert of slice and puts it into cache. Refuses to overwrite existing expert.
    pub fn save_one(&mut self, slice_id: u32, weights: W) -> Result<PathBuf, ExpertError>{
        let path = self.path_for(slice_id);
        if path.exists(){
            #[cfg(feature = "log_warn")]
            log::warn!("Expert of slice {} already exists at {:?}, keeping existing file", slice_id, path);
            return Err(ExpertError::AlreadyWritten {slice_id, path})
        }
        fs::create_dir_all(&self.dir)
            .map_err(|e| ExpertError::Io {path: self.dir.clone(), explanation: format!("{e}")})?;
        weights.save_to(&path)?;
        #[cfg(feature = "log_info")]
        log::info!("Expert of slice {} saved to {:?}", slice_id, path);
        self.experts.insert(slice_id, weights);
        Ok(path)
    }

    pub fn get(&self, slice_id: u32) -> Option<&W>{
        self.experts.get(&slice_id)
    }

    pub fn contains(&self, slice_id: u32) -> bool{
        self.experts.contains_key(&slice_id)
    }

    /// Cached slice ids in ascending order.
    pub fn ids(&self) -> Vec<u32>{
        self.experts.keys().copied().collect()
    }

    pub fn len(&self) -> usize{
        self.experts.len()
    }

    pub fn is_empty(&self) -> bool{
        self.experts.is_empty()
    }

    /// Inserts weights without touching disk.
    pub fn insert(&mut self, slice_id: u32, weights: W){
        self.experts.insert(slice_id, weights);
    }
}
