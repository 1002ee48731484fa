use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tboard::EventWriter;
use dashrelay_core::curriculum::Slice;
use dashrelay_core::orchestrator::{EpisodeSummary, TrainingObserver};
use crate::error::TrainerError;

pub const TRAINING_LOG: &str = "training_log.jsonl";
pub const DEATH_LOG: &str = "death_log.jsonl";

/// Entry of death log.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeathRecord{
    pub episode: u64,
    pub slice_id: u32,
    pub percent: f32,
}

fn append(path: &Path) -> Result<BufWriter<File>, TrainerError>{
    OpenOptions::new().create(true).append(true).open(path)
        .map(BufWriter::new)
        .map_err(|e| TrainerError::Journal {path: path.to_path_buf(), explanation: format!("{e}")})
}

/// Appends every episode to JSON lines files and optionally to tensorboard.
pub struct Journal{
    dir: PathBuf,
    training: BufWriter<File>,
    deaths: BufWriter<File>,
    tboard_writer: Option<EventWriter<File>>,
}

impl Journal{
    pub fn create<P: AsRef<Path>>(logs_dir: P) -> Result<Self, TrainerError>{
        let dir = logs_dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| TrainerError::Journal {path: dir.clone(), explanation: format!("{e}")})?;
        Ok(Self{
            training: append(&dir.join(TRAINING_LOG))?,
            deaths: append(&dir.join(DEATH_LOG))?,
            dir,
            tboard_writer: None,
        })
    }

    pub fn add_tboard_directory<B: AsRef<Path>>(&mut self, directory_path: B) -> Result<(), TrainerError>{
        fs::create_dir_all(directory_path.as_ref())
            .map_err(|e| TrainerError::Journal {path: directory_path.as_ref().to_path_buf(), explanation: format!("{e}")})?;
        let tboard = EventWriter::create(directory_path).map_err(|e|{
            TrainerError::Tboard {context: "Creating tboard EventWriter".into(), error: format!("{e}")}
        })?;
        self.tboard_writer = Some(tboard);
        Ok(())
    }

    pub fn dir(&self) -> &Path{
        &self.dir
    }

    pub fn record(&mut self, summary: &EpisodeSummary) -> Result<(), TrainerError>{
        let training_path = || self.dir.join(TRAINING_LOG);
        let line = serde_json::to_string(summary)
            .map_err(|e| TrainerError::Journal {path: training_path(), explanation: format!("{e}")})?;
        writeln!(self.training, "{line}")
            .and_then(|_| self.training.flush())
            .map_err(|e| TrainerError::Journal {path: training_path(), explanation: format!("{e}")})?;

        if summary.died{
            let death = DeathRecord{episode: summary.episode, slice_id: summary.slice_id, percent: summary.percent};
            let death_path = || self.dir.join(DEATH_LOG);
            let line = serde_json::to_string(&death)
                .map_err(|e| TrainerError::Journal {path: death_path(), explanation: format!("{e}")})?;
            writeln!(self.deaths, "{line}")
                .and_then(|_| self.deaths.flush())
                .map_err(|e| TrainerError::Journal {path: death_path(), explanation: format!("{e}")})?;
        }

        if let Some(tboard) = self.tboard_writer.as_mut(){
            let step = summary.episode as i64;
            let mut scalars = vec![
                ("episode/reward", summary.reward),
                ("episode/percent", summary.percent),
                ("episode/steps", summary.steps as f32),
                ("curriculum/success_rate", summary.success_rate),
                ("curriculum/slice", summary.slice_id as f32),
                ("policy/epsilon", summary.epsilon as f32),
            ];
            if let Some(loss) = summary.loss{
                scalars.push(("policy/loss", loss));
            }
            for (tag, value) in scalars{
                tboard.write_scalar(step, tag, value)
                    .map_err(|e| TrainerError::Tboard {context: format!("Saving {tag}"), error: format!("{e}")})?;
            }
        }
        Ok(())
    }
}

impl TrainingObserver for Journal{
    fn on_episode(&mut self, summary: &EpisodeSummary) {
        if let Err(e) = self.record(summary){
            log::warn!("Episode {} not journaled: {}", summary.episode, e);
        }
    }

    fn on_promotion(&mut self, mastered: &Slice, next: Option<&Slice>) {
        match next{
            Some(n) => log::info!("Promoted: slice {} ({}) mastered, next slice {} [{:.1}%, {:.1}%) in {} mode",
                mastered.id, mastered.description, n.id, n.start, n.end, n.mode),
            None => log::info!("Promoted: slice {} ({}) mastered, level complete", mastered.id, mastered.description),
        }
    }
}

#[cfg(test)]
mod tests{
    use std::fs;
    use dashrelay_core::orchestrator::{EpisodeSummary, TrainingObserver};
    use crate::journal::{DeathRecord, Journal, DEATH_LOG, TRAINING_LOG};

    fn summary(episode: u64, died: bool) -> EpisodeSummary{
        EpisodeSummary{
            episode,
            slice_id: 2,
            percent: 31.5,
            reward: -12.0,
            won: !died,
            died,
            steps: 40,
            epsilon: 0.5,
            loss: Some(0.25),
            success_rate: 0.1,
        }
    }

    #[test]
    fn episodes_and_deaths_are_appended(){
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        {
            let mut j = Journal::create(&logs).unwrap();
            j.on_episode(&summary(1, true));
            j.on_episode(&summary(2, false));
        }
        {
            let mut j = Journal::create(&logs).unwrap();
            j.on_episode(&summary(3, true));
        }
        let training = fs::read_to_string(logs.join(TRAINING_LOG)).unwrap();
        let episodes: Vec<EpisodeSummary> = training.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(episodes.iter().map(|e| e.episode).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(episodes[0], summary(1, true));

        let deaths: Vec<DeathRecord> = fs::read_to_string(logs.join(DEATH_LOG)).unwrap()
            .lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(deaths, vec![
            DeathRecord{episode: 1, slice_id: 2, percent: 31.5},
            DeathRecord{episode: 3, slice_id: 2, percent: 31.5},
        ]);
    }

    #[test]
    fn tensorboard_directory_is_created(){
        let dir = tempfile::tempdir().unwrap();
        let mut j = Journal::create(dir.path().join("logs")).unwrap();
        j.add_tboard_directory(dir.path().join("tb")).unwrap();
        j.record(&summary(1, false)).unwrap();
        assert!(fs::read_dir(dir.path().join("tb")).unwrap().count() > 0);
    }
}
