use std::rc::Rc;

use anyhow::Result;

use crate::prelude::Environment;

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// 'Physical' AI model abstraction
pub trait DeepQLearningModel<const BATCH_SIZE: usize = DEFAULT_BATCH_SIZE> {
    type E: Environment;

    /// Predicts the next action based on the current state.
    ///
    /// # Arguments
    /// * `state` flattened environment state (feature vector of len `S::SIZE`)
    ///
    fn predict_action(
        &self,
        state: &<Self::E as Environment>::S,
    ) -> <Self::E as Environment>::A;

    /// Predicts the maximum expectable future reward for each state of the batch
    fn batch_predict_max_future_reward(
        &self,
        state_batch: [&Rc<<Self::E as Environment>::S>; BATCH_SIZE],
    ) -> [f32; BATCH_SIZE];

    /// Performs a single training step using a batch of data.
    ///
    /// # Arguments
    /// * `state_batch` batch of states
    /// * `action_batch` the actions taken in those states
    /// * `updated_q_values` the Q-values the model shall learn for those state/action pairs
    ///
    /// # Returns
    ///   calculated loss
    ///
    fn train(
        &mut self,
        state_batch: [&Rc<<Self::E as Environment>::S>; BATCH_SIZE],
        action_batch: [<Self::E as Environment>::A; BATCH_SIZE],
        updated_q_values: [f32; BATCH_SIZE],
    ) -> Result<f32>;

    /// Writes the model parameters to `file` (the serialization format may append its own extension).
    /// Returns the path of the written file.
    fn write_checkpoint(
        &self,
        file: &str,
    ) -> Result<String>;

    fn read_checkpoint(
        &mut self,
        file: &str,
    ) -> Result<()>;
}
