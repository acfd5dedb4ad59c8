use std::ops::Range;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use itertools::Itertools;
use num_format::ToFormattedString;
use rand::distributions::{Distribution, Uniform};
use rand::prelude::ThreadRng;
use rand::Rng;

use crate::learn::replay_buffer::ReplayBuffer;
use crate::ml_model::model::DeepQLearningModel;
use crate::prelude::{Action, DebugVisualizer, Environment};
use crate::util::format;
use crate::util::immutable::Immutable;

pub struct Parameter {
    /// Discount rate; (0 <= 𝛾 <= 1) represents the value of future rewards. The bigger, the more farsighted the agent becomes
    pub gamma: f32,
    /// Maximum epsilon greedy parameter
    pub epsilon_max: f64,
    /// Minimum epsilon greedy parameter
    pub epsilon_min: f64,
    pub max_steps_per_episode: usize,
    // Number of steps to take only random action and observe output
    pub epsilon_pure_random_steps: usize,
    // Number of steps for exploration
    pub epsilon_greedy_steps: f64,
    // Maximum replay length
    // Note from python reference code: The Deepmind paper suggests 1000000 however this causes memory issues
    pub history_buffer_len: usize,
    // Train the model after n actions
    pub update_after_actions: usize,
    // After how many steps the target network gets updated
    pub update_target_network_after_num_steps: usize,
    // this determines directly the number of recent goal-achieving episodes required to consider the learning task done
    pub episode_reward_history_buffer_len: usize,
    pub stats_after_steps: usize,
    // Percentage of total reward goal, which any single episode needs to reach (regardless of the average reward)
    pub lowest_episode_reward_goal_threshold_pct: f32,
}

impl Parameter {
    fn epsilon_interval(&self) -> f64 { self.epsilon_max - self.epsilon_min }
}

impl Default for Parameter {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            epsilon_max: 1.0,
            epsilon_min: 0.1,
            max_steps_per_episode: 10_000,
            epsilon_pure_random_steps: 50_000,
            epsilon_greedy_steps: 1_000_000.0,
            history_buffer_len: 1_000_000,
            update_after_actions: 4,
            update_target_network_after_num_steps: 10_000,
            episode_reward_history_buffer_len: 100,
            stats_after_steps: 25_000,
            lowest_episode_reward_goal_threshold_pct: 0.9,
        }
    }
}

/// A self-driving deep Q learning algorithm.
///
/// It is directly connected to an [Environment] and drives the speed of the
/// steps in that environment with its response. Uses two model instances -
/// the trained one and a stabilized copy used for future-reward prediction,
/// synced via the model checkpoint file.
///
/// (Concept from the keras deep_q_network_breakout example)
pub struct SelfDrivingQLearner<E, M, const BATCH_SIZE: usize>
where
    E: Environment,
    M: DeepQLearningModel<BATCH_SIZE, E = E>,
{
    environment: Arc<RwLock<E>>,
    param: Immutable<Parameter>,
    rng: ThreadRng,
    model: M,
    // "target model"
    stabilized_model: M,
    checkpoint_file: PathBuf,
    replay_buffer: ReplayBuffer<E::S, E::A>,
    step_count: usize,
    episode_count: usize,
    running_reward: f32,
    /// Epsilon greedy parameter
    epsilon: f64,
}

impl<E, M, const BATCH_SIZE: usize> SelfDrivingQLearner<E, M, BATCH_SIZE>
where
    E: Environment,
    M: DeepQLearningModel<BATCH_SIZE, E = E>,
{
    pub fn new(
        environment: Arc<RwLock<E>>,
        param: Parameter,
        load_model_fn: fn() -> Result<M>,
        checkpoint_file: PathBuf,
    ) -> Result<Self> {
        let replay_buffer = ReplayBuffer::new(param.history_buffer_len, param.episode_reward_history_buffer_len);
        let epsilon = param.epsilon_max;

        Ok(Self {
            environment,
            param: Immutable::new(param),
            rng: rand::thread_rng(),
            model: load_model_fn()?,
            stabilized_model: load_model_fn()?,
            checkpoint_file,
            replay_buffer,
            step_count: 0,
            episode_count: 0,
            running_reward: 0.0,
            epsilon,
        })
    }

    pub fn learn_till_mastered(&mut self) -> Result<()> {
        while !self.solved() {
            self.learn_episode()?
        }
        Ok(())
    }

    /// Runs whole learning episodes until the cumulative environment-interaction
    /// step counter has reached `total_steps`.
    pub fn learn_until_step_limit(
        &mut self,
        total_steps: usize,
    ) -> Result<()> {
        while self.step_count < total_steps {
            self.learn_episode()?
        }
        Ok(())
    }

    pub fn solved(&self) -> bool {
        let env = self.environment.read().unwrap();
        self.running_reward >= env.episode_reward_goal_mean()
            && self.replay_buffer.min_episode_reward()
                >= env.episode_reward_goal_mean() * self.param.lowest_episode_reward_goal_threshold_pct
    }

    pub fn step_count(&self) -> usize { self.step_count }

    pub fn episode_count(&self) -> usize { self.episode_count }

    /// Persists the learned parameters of the trained model.
    /// Returns the path of the written artifact.
    pub fn save_model(
        &self,
        file: &str,
    ) -> Result<String> {
        self.model.write_checkpoint(file)
    }

    pub fn learn_episode(&mut self) -> Result<()> {
        let mut state = {
            let mut env = self.environment.write().unwrap();
            env.reset()?;
            env.state_as_rc()
        };
        log::trace!("started learning episode {}", self.episode_count);

        let mut episode_reward: f32 = 0.0;

        for _ in 0..self.param.max_steps_per_episode {
            self.step_count += 1;

            // Use epsilon-greedy for exploration
            let action: E::A = if self.step_count < self.param.epsilon_pure_random_steps || self.epsilon > self.rng.gen_range(0_f64..1_f64)
            {
                // Take random action
                let a = self.rng.gen_range(0..E::A::ACTION_SPACE);
                Action::try_from_numeric(a)?
            } else {
                // Predict best action Q-values from environment state
                self.model.predict_action(&state)
            };

            // Decay probability of taking random action
            self.epsilon = f64::max(
                self.epsilon - self.param.epsilon_interval() / self.param.epsilon_greedy_steps,
                self.param.epsilon_min,
            );

            log::trace!("{}", state.one_line_info());
            // Apply the sampled action in our environment
            let (state_next, reward, done) = self.environment.write().unwrap().step(action)?;
            log::trace!("step with action {} resulted in reward: {:.2}, done: {}", action, reward, done);

            episode_reward += reward;

            // Save actions and states in replay buffer
            self.replay_buffer.add(action, state, Rc::clone(&state_next), reward, done);
            state = state_next;

            // Update every n-th step (e.g. fourth frame), once the replay buffer is beyond BATCH_SIZE
            if self.step_count % self.param.update_after_actions == 0 && self.replay_buffer.len() > BATCH_SIZE {
                // Get indices of samples for replay buffers
                let indices: [usize; BATCH_SIZE] = generate_distinct_random_ids(&mut self.rng, 0..self.replay_buffer.len());

                let replay_samples = self.replay_buffer.get_many(&indices);

                // Build the updated Q-values for the sampled future states
                // Use the target model for stability
                let max_future_rewards = self.stabilized_model.batch_predict_max_future_reward(replay_samples.state_next);

                // Q value = reward + discount factor * expected future reward
                let mut updated_q_values = add_arrays(&replay_samples.reward, &array_mul(max_future_rewards, self.param.gamma));

                // for terminal steps, the updated q-value shall be exactly the reward (see deepmind paper)
                for (i, &done) in replay_samples.done.iter().enumerate() {
                    if done {
                        updated_q_values[i] = replay_samples.reward[i]
                    }
                }

                let loss = self.model.train(replay_samples.state, replay_samples.action, updated_q_values)?;
                log::trace!("training step loss: {:.5}", loss);
            }

            if self.step_count % self.param.update_target_network_after_num_steps == 0 {
                // sync the target network with the trained weights
                self.model.write_checkpoint(self.checkpoint_file.to_str().unwrap())?;
                self.stabilized_model.read_checkpoint(self.checkpoint_file.to_str().unwrap())?;
            }

            if self.step_count % self.param.stats_after_steps == 0 {
                self.learning_update_log();
            }

            if done {
                break;
            }
        }

        // Update running reward to check condition for solving
        self.replay_buffer.add_episode_reward(episode_reward);
        if self.episode_count >= self.param.episode_reward_history_buffer_len {
            self.running_reward = self.replay_buffer.avg_episode_reward();
        }
        self.episode_count += 1;

        if self.solved() {
            self.model.write_checkpoint(self.checkpoint_file.to_str().unwrap())?;
            self.learning_update_log()
        }

        Ok(())
    }

    fn learning_update_log(&self) {
        let number_format = format::number_format();

        let action_counts = self.replay_buffer.action_counts();
        let total_actions: usize = action_counts.values().sum();
        let action_distribution_line = action_counts
            .iter()
            .sorted_by_key(|(action, _)| action.numeric())
            .map(|(&action, &count)| {
                let ratio = 100.0 * count as f32 / total_actions as f32;
                format!("{} {:.1}%", action, ratio)
            })
            .join(", ");

        let reward_goal_mean = self.environment.read().unwrap().episode_reward_goal_mean();
        log::info!(
            "\n\
    episode: {}, steps: {}, 𝛾={:.2}, 𝜀={:.2}, reward_goal: {{mean >= {:.1}, low >= {:.1}}}, current_rewards: {{mean: {:.1}, low: {:.1}}}\n\
    action_distribution (of last {}): {}",
            self.episode_count.to_formatted_string(&number_format),
            self.step_count.to_formatted_string(&number_format),
            self.param.gamma,
            self.epsilon,
            reward_goal_mean,
            reward_goal_mean * self.param.lowest_episode_reward_goal_threshold_pct,
            self.replay_buffer.avg_episode_reward(),
            self.replay_buffer.min_episode_reward(),
            total_actions.to_formatted_string(&number_format),
            action_distribution_line
        );
    }
}

fn generate_distinct_random_ids<const BATCH_SIZE: usize>(
    rng: &mut ThreadRng,
    range: Range<usize>,
) -> [usize; BATCH_SIZE] {
    assert!(range.end - range.start >= BATCH_SIZE);
    let mut result = [0_usize; BATCH_SIZE];

    let distribution = Uniform::from(range);

    for i in 0..BATCH_SIZE {
        result[i] = loop {
            let x = distribution.sample(rng);
            if !result[0..i].contains(&x) {
                break x;
            }
        }
    }
    result
}

fn add_arrays<const N: usize>(
    lhs: &[f32; N],
    rhs: &[f32; N],
) -> [f32; N] {
    let mut result = [0_f32; N];
    for (i, r) in result.iter_mut().enumerate() {
        *r = lhs[i] + rhs[i];
    }
    result
}

fn array_mul<const N: usize>(
    slice: [f32; N],
    value: f32,
) -> [f32; N] {
    slice.map(|e| e * value)
}
