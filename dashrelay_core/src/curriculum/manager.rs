use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::curriculum::{PromotionGate, RollingWindow, Slice, SliceSet};
use crate::error::CurriculumError;

/// Persisted curriculum progress.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumState{
    /// Position in sorted slice list (0 based).
    pub slice_idx: usize,
    /// Monotonic number of environment steps taken in training.
    pub total_steps: u64,
}

/// Owns slice list, rolling window of outcomes on current slice and persisted progress.
///
/// State machine is a single index into the slice list. It moves only forward, one slice at a time,
/// and every move is written to the progress file before [`advance`](CurriculumManager::advance) returns.
#[derive(Debug)]
pub struct CurriculumManager{
    slices: SliceSet,
    state: CurriculumState,
    window: RollingWindow,
    gate: PromotionGate,
    progress_path: Option<PathBuf>,
    best_rate: f32,
}

impl CurriculumManager{

    /// Manager without persistence starting at the first slice.
    pub fn new(slices: SliceSet, gate: PromotionGate) -> Self{
        Self{
            slices,
            state: CurriculumState::default(),
            window: RollingWindow::new(gate.window),
            gate,
            progress_path: None,
            best_rate: 0.0,
        }
    }

    /// Manager persisting progress to `progress_path`, resuming from it if it holds a usable state.
    pub fn with_progress<P: AsRef<Path>>(slices: SliceSet, gate: PromotionGate, progress_path: P) -> Self{
        let mut manager = Self::new(slices, gate);
        manager.progress_path = Some(progress_path.as_ref().to_path_buf());
        manager.load_state();
        manager
    }

    /// Reads slice definition file. Missing or malformed definition is an error,
    /// missing or malformed progress file means fresh start.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(definition: P, progress_path: Q, gate: PromotionGate) -> Result<Self, CurriculumError>{
        let slices = SliceSet::from_file(definition)?;
        Ok(Self::with_progress(slices, gate, progress_path))
    }

    /// Tries to resume from progress file. Returns `true` when state was restored.
    /// On any problem state is reset to the first slice.
    pub fn load_state(&mut self) -> bool{
        let path = match &self.progress_path{
            None => return false,
            Some(p) => p
        };
        let restored = match fs::read_to_string(path){
            Err(_e) => {
                #[cfg(feature = "log_info")]
                log::info!("No curriculum progress at {:?} ({}), starting from first slice", path, _e);
                None
            },
            Ok(text) => match serde_json::from_str::<CurriculumState>(&text){
                Ok(state) if state.slice_idx < self.slices.len() => Some(state),
                Ok(_state) => {
                    #[cfg(feature = "log_warn")]
                    log::warn!("Progress file {:?} points to slice index {} out of {} slices, starting fresh",
                        path, _state.slice_idx, self.slices.len());
                    None
                },
                Err(_e) => {
                    #[cfg(feature = "log_warn")]
                    log::warn!("Progress file {:?} is malformed ({}), starting fresh", path, _e);
                    None
                }
            }
        };
        self.window.clear();
        self.best_rate = 0.0;
        match restored{
            Some(state) => {
                self.state = state;
                #[cfg(feature = "log_info")]
                log::info!("Resuming curriculum at slice {} (index {}), {} steps done",
                    self.current_slice().id, state.slice_idx, state.total_steps);
                true
            },
            None => {
                self.state = CurriculumState::default();
                false
            }
        }
    }

    /// Writes progress file. Without configured path this does nothing.
    pub fn save_state(&self) -> Result<(), CurriculumError>{
        self.write_state(&self.state)
    }

    fn write_state(&self, state: &CurriculumState) -> Result<(), CurriculumError>{
        let path = match &self.progress_path{
            None => return Ok(()),
            Some(p) => p
        };
        let failed = |explanation: String| CurriculumError::PersistFailed {path: path.clone(), explanation};
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()){
            fs::create_dir_all(parent).map_err(|e| failed(format!("{e}")))?;
        }
        let text = serde_json::to_string_pretty(state).map_err(|e| failed(format!("{e}")))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(|e| failed(format!("{e}")))?;
        fs::rename(&tmp, path).map_err(|e| failed(format!("{e}")))?;
        Ok(())
    }

    /// Records outcome of episode that took `steps` environment steps. Returns current success rate.
    pub fn update(&mut self, won: bool, steps: u64) -> f32{
        self.state.total_steps += steps;
        let rate = self.window.push(won);
        if self.window.len() >= self.gate.min_episodes && rate > self.best_rate{
            self.best_rate = rate;
        }
        rate
    }

    pub fn should_promote(&self) -> bool{
        self.gate.is_open(&self.window)
    }

    /// Moves to the next slice and persists progress. Returns `Ok(false)` without any change
    /// when current slice is the last one.
    pub fn advance(&mut self) -> Result<bool, CurriculumError>{
        if self.state.slice_idx + 1 >= self.slices.len(){
            return Ok(false)
        }
        let next = CurriculumState{slice_idx: self.state.slice_idx + 1, ..self.state};
        self.write_state(&next)?;
        self.state = next;
        self.window.clear();
        self.best_rate = 0.0;
        #[cfg(feature = "log_info")]
        log::info!("Curriculum advanced to slice {} [{:.1}%, {:.1}%) in {} mode",
            self.current_slice().id, self.current_slice().start, self.current_slice().end, self.current_slice().mode);
        Ok(true)
    }

    pub fn current_slice(&self) -> &Slice{
        // index is kept in range by constructor, load_state and advance
        &self.slices.as_slice()[self.state.slice_idx.min(self.slices.len() - 1)]
    }

    pub fn previous_slice(&self) -> Option<&Slice>{
        self.state.slice_idx.checked_sub(1).and_then(|i| self.slices.get(i))
    }

    pub fn is_last_slice(&self) -> bool{
        self.state.slice_idx + 1 == self.slices.len()
    }

    pub fn slices(&self) -> &SliceSet{
        &self.slices
    }

    pub fn state(&self) -> CurriculumState{
        self.state
    }

    pub fn slice_idx(&self) -> usize{
        self.state.slice_idx
    }

    pub fn total_steps(&self) -> u64{
        self.state.total_steps
    }

    pub fn success_rate(&self) -> f32{
        self.window.success_rate()
    }

    /// Best success rate seen on current slice once window had enough episodes.
    pub fn best_rate(&self) -> f32{
        self.best_rate
    }

    pub fn window(&self) -> &RollingWindow{
        &self.window
    }

    pub fn gate(&self) -> &PromotionGate{
        &self.gate
    }
}

#[cfg(test)]
mod tests{
    use std::fs;
    use crate::curriculum::{CurriculumManager, CurriculumState, PromotionGate, Slice, SliceSet};
    use crate::frame::PlayerMode;

    fn three_slices() -> SliceSet{
        SliceSet::new(vec![
            Slice::new(1, 0.0, 30.0, PlayerMode::Ground),
            Slice::new(2, 30.0, 60.0, PlayerMode::Flight),
            Slice::new(3, 60.0, 100.0, PlayerMode::Ground),
        ]).unwrap()
    }

    #[test]
    fn advance_moves_one_slice_and_persists(){
        let dir = tempfile::tempdir().unwrap();
        let progress = dir.path().join("logs").join("training_meta.json");
        let mut m = CurriculumManager::with_progress(three_slices(), PromotionGate::default(), &progress);
        assert_eq!(m.slice_idx(), 0);
        for _ in 0..25{
            m.update(true, 10);
        }
        assert!(m.should_promote());
        assert!(m.advance().unwrap());
        assert_eq!(m.slice_idx(), 1);
        assert!(m.window().is_empty());
        assert!(!m.should_promote());
        let saved: CurriculumState = serde_json::from_str(&fs::read_to_string(&progress).unwrap()).unwrap();
        assert_eq!(saved, CurriculumState{slice_idx: 1, total_steps: 250});
    }

    #[test]
    fn advance_on_last_slice_changes_nothing(){
        let mut m = CurriculumManager::new(three_slices(), PromotionGate::default());
        assert!(m.advance().unwrap());
        assert!(m.advance().unwrap());
        assert!(m.is_last_slice());
        m.update(true, 1);
        assert!(!m.advance().unwrap());
        assert_eq!(m.slice_idx(), 2);
        assert_eq!(m.window().len(), 1);
        assert_eq!(m.current_slice().id, 3);
    }

    #[test]
    fn state_round_trips_through_file(){
        let dir = tempfile::tempdir().unwrap();
        let progress = dir.path().join("meta.json");
        let mut m = CurriculumManager::with_progress(three_slices(), PromotionGate::default(), &progress);
        m.update(false, 77);
        m.advance().unwrap();
        m.update(false, 5);
        m.save_state().unwrap();
        let resumed = CurriculumManager::with_progress(three_slices(), PromotionGate::default(), &progress);
        assert_eq!(resumed.state(), m.state());
        assert_eq!(resumed.current_slice().id, 2);
        assert_eq!(resumed.previous_slice().unwrap().id, 1);
    }

    #[test]
    fn broken_progress_means_fresh_start(){
        let dir = tempfile::tempdir().unwrap();
        let progress = dir.path().join("meta.json");
        fs::write(&progress, "slice_idx = 2").unwrap();
        let m = CurriculumManager::with_progress(three_slices(), PromotionGate::default(), &progress);
        assert_eq!(m.state(), CurriculumState::default());

        fs::write(&progress, r#"{"slice_idx": 9, "total_steps": 100}"#).unwrap();
        let m = CurriculumManager::with_progress(three_slices(), PromotionGate::default(), &progress);
        assert_eq!(m.state(), CurriculumState::default());
    }

    #[test]
    fn missing_fields_take_defaults(){
        let dir = tempfile::tempdir().unwrap();
        let progress = dir.path().join("meta.json");
        fs::write(&progress, r#"{"slice_idx": 2}"#).unwrap();
        let m = CurriculumManager::with_progress(three_slices(), PromotionGate::default(), &progress);
        assert_eq!(m.state(), CurriculumState{slice_idx: 2, total_steps: 0});
        assert_eq!(m.current_slice().id, 3);
    }

    #[test]
    fn failed_persist_leaves_slice_unchanged(){
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("logs");
        fs::write(&blocker, "not a directory").unwrap();
        let progress = blocker.join("meta.json");
        let mut m = CurriculumManager::with_progress(three_slices(), PromotionGate::default(), &progress);
        for _ in 0..25{
            m.update(true, 2);
        }
        assert!(m.advance().is_err());
        assert_eq!(m.slice_idx(), 0);
        assert_eq!(m.window().len(), 25);
        assert!(m.should_promote());
        assert_eq!(m.total_steps(), 50);
    }

    #[test]
    fn best_rate_is_tracked_after_minimum(){
        let mut m = CurriculumManager::new(three_slices(), PromotionGate::default());
        for _ in 0..10{
            m.update(true, 1);
        }
        assert_eq!(m.best_rate(), 0.0);
        for _ in 0..10{
            m.update(false, 1);
        }
        assert_eq!(m.best_rate(), 0.5);
        m.update(false, 1);
        assert_eq!(m.best_rate(), 0.5);
        assert_eq!(m.total_steps(), 21);
    }
}
