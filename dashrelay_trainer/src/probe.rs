use serde::{Deserialize, Serialize};
use dashrelay_core::channel::{SharedChannel, SharedRegion};
use dashrelay_core::frame::{Action, PlayerMode};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeSample{
    pub percent: f32,
    pub hazard_distance: f32,
    pub dead: bool,
    pub mode: PlayerMode,
    pub objects_present: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport{
    pub frames: usize,
    pub stale_reads: u64,
    pub first: Option<ProbeSample>,
    pub last: Option<ProbeSample>,
    pub max_percent: f32,
    pub deaths_seen: usize,
}

/// Reads `frames` frames answering each with [`Action::Release`], so the game keeps running
/// without the player doing anything.
pub fn probe<R: SharedRegion>(channel: &mut SharedChannel<R>, frames: usize) -> ProbeReport{
    let stale_before = channel.stale_reads();
    let mut report = ProbeReport{
        frames: 0,
        stale_reads: 0,
        first: None,
        last: None,
        max_percent: 0.0,
        deaths_seen: 0,
    };
    for i in 0..frames{
        let frame = channel.read();
        channel.write_action(Action::Release);
        let sample = ProbeSample{
            percent: frame.percent,
            hazard_distance: frame.hazard_distance,
            dead: frame.dead,
            mode: frame.mode,
            objects_present: frame.objects.iter().filter(|o| o.is_present()).count(),
        };
        log::debug!("Frame {:>4}: {:>5.1}% hazard {:>7.1} dead {} mode {} objects {}",
            i, sample.percent, sample.hazard_distance, sample.dead, sample.mode, sample.objects_present);
        if sample.dead && !report.last.is_some_and(|l| l.dead){
            report.deaths_seen += 1;
        }
        report.max_percent = report.max_percent.max(sample.percent);
        report.first.get_or_insert(sample);
        report.last = Some(sample);
        report.frames += 1;
    }
    report.stale_reads = channel.stale_reads() - stale_before;
    report
}
