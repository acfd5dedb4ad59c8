use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::prelude::Action;

/// Aligned batch of replay samples as delivered by [ReplayBuffer::get_many]
pub struct ReplaySamples<'a, S, A, const N: usize> {
    pub state: [&'a Rc<S>; N],
    pub state_next: [&'a Rc<S>; N],
    pub action: [A; N],
    pub reward: [f32; N],
    pub done: [bool; N],
}

/// Experience replay history.
///
/// Step entries are kept in aligned bounded ring buffers - adding a step beyond
/// capacity evicts the oldest one from all of them. Episode rewards have their
/// own (usually much shorter) ring buffer.
pub struct ReplayBuffer<S, A>
where A: Action
{
    max_step_len: usize,
    max_episode_reward_len: usize,
    action: VecDeque<A>,
    state: VecDeque<Rc<S>>,
    state_next: VecDeque<Rc<S>>,
    reward: VecDeque<f32>,
    done: VecDeque<bool>,
    episode_reward: VecDeque<f32>,
}

impl<S, A> ReplayBuffer<S, A>
where A: Action
{
    pub fn new(
        max_step_len: usize,
        max_episode_reward_len: usize,
    ) -> Self {
        assert!(max_step_len > 0);
        assert!(max_episode_reward_len > 0);
        Self {
            max_step_len,
            max_episode_reward_len,
            action: VecDeque::with_capacity(max_step_len.min(1024)),
            state: VecDeque::with_capacity(max_step_len.min(1024)),
            state_next: VecDeque::with_capacity(max_step_len.min(1024)),
            reward: VecDeque::with_capacity(max_step_len.min(1024)),
            done: VecDeque::with_capacity(max_step_len.min(1024)),
            episode_reward: VecDeque::with_capacity(max_episode_reward_len),
        }
    }

    /// Number of stored steps
    pub fn len(&self) -> usize { self.done.len() }

    pub fn is_empty(&self) -> bool { self.done.is_empty() }

    pub fn add(
        &mut self,
        action: A,
        state: Rc<S>,
        state_next: Rc<S>,
        reward: f32,
        done: bool,
    ) {
        if self.done.len() >= self.max_step_len {
            self.action.pop_front();
            self.state.pop_front();
            self.state_next.pop_front();
            self.reward.pop_front();
            self.done.pop_front();
        }
        self.action.push_back(action);
        self.state.push_back(state);
        self.state_next.push_back(state_next);
        self.reward.push_back(reward);
        self.done.push_back(done);
    }

    /// Returns the aligned samples at the specified `indices`
    pub fn get_many<const N: usize>(
        &self,
        indices: &[usize; N],
    ) -> ReplaySamples<'_, S, A, N> {
        debug_assert!(!indices.iter().any(|&i| i >= self.len()));
        ReplaySamples {
            state: indices.map(|i| &self.state[i]),
            state_next: indices.map(|i| &self.state_next[i]),
            action: indices.map(|i| self.action[i]),
            reward: indices.map(|i| self.reward[i]),
            done: indices.map(|i| self.done[i]),
        }
    }

    pub fn add_episode_reward(
        &mut self,
        episode_reward: f32,
    ) {
        if self.episode_reward.len() >= self.max_episode_reward_len {
            self.episode_reward.pop_front();
        }
        self.episode_reward.push_back(episode_reward);
    }

    pub fn num_episode_rewards(&self) -> usize { self.episode_reward.len() }

    pub fn avg_episode_reward(&self) -> f32 {
        if self.episode_reward.is_empty() {
            0.0
        } else {
            self.episode_reward.iter().sum::<f32>() / self.episode_reward.len() as f32
        }
    }

    /// Lowest episode reward in the history. [f32::MIN] while no episode finished yet,
    /// which keeps a solved-criterion based on this value unreachable until then.
    pub fn min_episode_reward(&self) -> f32 {
        if self.episode_reward.is_empty() {
            f32::MIN
        } else {
            self.episode_reward.iter().copied().fold(f32::INFINITY, f32::min)
        }
    }

    /// Occurrences per action over the stored step history
    pub fn action_counts(&self) -> FxHashMap<A, usize> {
        let mut counts = FxHashMap::<A, usize>::default();
        for &a in &self.action {
            counts.entry(a).and_modify(|e| *e += 1).or_insert(1);
        }
        counts
    }
}
