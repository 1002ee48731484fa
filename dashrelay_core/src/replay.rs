use std::collections::VecDeque;
use crate::frame::Action;
use crate::observation::Observation;

/// Single experience of interaction with environment.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition{
    pub observation: Observation,
    pub action: Action,
    pub reward: f32,
    pub next_observation: Observation,
    pub terminated: bool,
}

/// Bounded memory of items sampled uniformly. When full, oldest items are evicted.
#[derive(Clone, Debug)]
pub struct ReplayBuffer<T>{
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> ReplayBuffer<T>{
    /// Capacity of `0` is treated as `1`.
    pub fn new(capacity: usize) -> Self{
        let capacity = capacity.max(1);
        Self{capacity, items: VecDeque::with_capacity(capacity.min(4096))}
    }

    pub fn push(&mut self, item: T){
        if self.items.len() == self.capacity{
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize{
        self.items.len()
    }

    pub fn is_empty(&self) -> bool{
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize{
        self.capacity
    }

    pub fn clear(&mut self){
        self.items.clear()
    }

    /// Samples `batch_size` distinct items without replacement.
    /// Returns `None` if there is not enough items stored.
    pub fn sample(&self, batch_size: usize) -> Option<Vec<&T>>{
        if batch_size > self.items.len(){
            return None
        }
        let mut rng = rand::rng();
        Some(rand::seq::index::sample(&mut rng, self.items.len(), batch_size)
            .into_iter()
            .map(|i| &self.items[i])
            .collect())
    }
}
