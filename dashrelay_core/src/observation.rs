use std::collections::VecDeque;
use crate::frame::{NearbyObject, RawFrame, MAX_OBJECTS};

/// Number of player features in a single normalised frame.
pub const PLAYER_FEATURES: usize = 4;
/// Number of features describing one object slot.
pub const OBJECT_FEATURES: usize = 5;
/// Length of single normalised frame.
pub const SINGLE_FRAME_LEN: usize = PLAYER_FEATURES + MAX_OBJECTS * OBJECT_FEATURES;

const VEL_Y_SCALE: f32 = 30.0;
const Y_SCALE: f32 = 900.0;
const DX_SCALE: f32 = 1000.0;
const DY_SCALE: f32 = 300.0;
const SIZE_SCALE: f32 = 50.0;
const KIND_SCALE: f32 = 10.0;

/// Features written for an absent object: far away, no geometry.
const ABSENT_OBJECT: [f32; OBJECT_FEATURES] = [1.0, 0.0, 0.0, 0.0, 0.0];

/// Vector given to the policy.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Observation(Vec<f32>);

impl Observation{
    pub fn new(values: Vec<f32>) -> Self{
        Self(values)
    }
    pub fn as_slice(&self) -> &[f32]{
        &self.0
    }
    pub fn len(&self) -> usize{
        self.0.len()
    }
    pub fn is_empty(&self) -> bool{
        self.0.is_empty()
    }
    pub fn into_inner(self) -> Vec<f32>{
        self.0
    }
}

impl AsRef<[f32]> for Observation{
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

#[inline]
fn guard(v: f32) -> f32{
    if v.is_nan(){
        0.0
    } else if v == f32::INFINITY{
        1.0
    } else if v == f32::NEG_INFINITY{
        -1.0
    } else {
        v
    }
}

fn push_object(out: &mut Vec<f32>, object: &NearbyObject){
    if object.is_present(){
        out.extend_from_slice(&[
            object.dx / DX_SCALE,
            object.dy / DY_SCALE,
            object.width / SIZE_SCALE,
            object.height / SIZE_SCALE,
            object.kind as f32 / KIND_SCALE,
        ]);
    } else {
        out.extend_from_slice(&ABSENT_OBJECT);
    }
}

/// Normalises single frame into vector of [`SINGLE_FRAME_LEN`] finite values.
pub fn normalize(frame: &RawFrame) -> Vec<f32>{
    let mut out = Vec::with_capacity(SINGLE_FRAME_LEN);
    out.push(frame.vel_y / VEL_Y_SCALE);
    out.push(frame.y / Y_SCALE);
    out.push(if frame.on_ground { 1.0 } else { 0.0 });
    out.push(frame.mode.code() as f32);
    for object in frame.objects.iter(){
        push_object(&mut out, object);
    }
    out.iter_mut().for_each(|v| *v = guard(*v));
    out
}

/// Trailing window of normalised frames.
#[derive(Clone, Debug)]
pub struct FrameStack{
    depth: usize,
    frames: VecDeque<Vec<f32>>,
}

impl FrameStack{
    /// Depth of `0` is treated as `1`.
    pub fn new(depth: usize) -> Self{
        let depth = depth.max(1);
        Self{depth, frames: VecDeque::with_capacity(depth)}
    }

    pub fn depth(&self) -> usize{
        self.depth
    }

    /// Length of every observation produced by this stack.
    pub fn observation_len(&self) -> usize{
        SINGLE_FRAME_LEN * self.depth
    }

    /// Fills every slot with the same frame.
    pub fn reset_with(&mut self, frame: Vec<f32>) -> Observation{
        self.frames.clear();
        for _ in 1..self.depth{
            self.frames.push_back(frame.clone());
        }
        self.frames.push_back(frame);
        self.observation()
    }

    /// Pushes newest frame dropping oldest when full.
    pub fn push(&mut self, frame: Vec<f32>) -> Observation{
        if self.frames.is_empty(){
            return self.reset_with(frame)
        }
        if self.frames.len() == self.depth{
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
        self.observation()
    }

    /// Concatenation of window, oldest first.
    pub fn observation(&self) -> Observation{
        let mut v = Vec::with_capacity(self.observation_len());
        for f in self.frames.iter(){
            v.extend_from_slice(f);
        }
        Observation(v)
    }
}

#[cfg(test)]
mod tests{
    use bytemuck::Zeroable;
    use crate::frame::{ObjectRecord, RawFrame, SharedRecord, MAX_OBJECTS};
    use crate::observation::{normalize, FrameStack, SINGLE_FRAME_LEN};

    fn frame_with(setup: impl FnOnce(&mut SharedRecord)) -> RawFrame{
        let mut record = SharedRecord::zeroed();
        record.objects = [ObjectRecord::empty(); MAX_OBJECTS];
        setup(&mut record);
        RawFrame::from_record(&record)
    }

    #[test]
    fn absent_objects_are_far_and_empty(){
        let frame = frame_with(|r| {
            r.player_vel_y = 15.0;
            r.player_y = 450.0;
            r.on_ground = 1;
            r.player_mode = 1;
            r.objects[0] = ObjectRecord{dx: 100.0, dy: -30.0, width: 25.0, height: 50.0, kind: 2};
        });
        let v = normalize(&frame);
        assert_eq!(v.len(), SINGLE_FRAME_LEN);
        assert_eq!(&v[..4], &[0.5, 0.5, 1.0, 1.0]);
        assert_eq!(&v[4..9], &[0.1, -0.1, 0.5, 1.0, 0.2]);
        assert_eq!(&v[9..14], &[1.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(v.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn huge_values_stay_finite(){
        let frame = frame_with(|r| {
            r.objects[3] = ObjectRecord{dx: f32::MAX, dy: 0.0, width: 1.0, height: 1.0, kind: 1};
            r.player_vel_y = f32::MAX;
        });
        assert!(normalize(&frame).iter().all(|x| x.is_finite()));
    }

    #[test]
    fn stack_keeps_constant_length_and_order(){
        let mut stack = FrameStack::new(3);
        let first = stack.reset_with(vec![0.0; SINGLE_FRAME_LEN]);
        assert_eq!(first.len(), 3 * SINGLE_FRAME_LEN);
        stack.push(vec![1.0; SINGLE_FRAME_LEN]);
        let o = stack.push(vec![2.0; SINGLE_FRAME_LEN]);
        assert_eq!(o.len(), 3 * SINGLE_FRAME_LEN);
        assert_eq!(o.as_slice()[0], 0.0);
        assert_eq!(o.as_slice()[SINGLE_FRAME_LEN], 1.0);
        assert_eq!(o.as_slice()[2 * SINGLE_FRAME_LEN], 2.0);
        let o = stack.push(vec![3.0; SINGLE_FRAME_LEN]);
        assert_eq!(o.as_slice()[0], 1.0);
        assert_eq!(o.len(), 3 * SINGLE_FRAME_LEN);
    }
}
