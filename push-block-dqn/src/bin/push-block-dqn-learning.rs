use std::sync::{Arc, RwLock};

use anyhow::Result;

use push_block_dqn::ml_model::burn_model::{adam_optimizer, QLearningBurnModel};
use push_block_env::gym_wrapper::GymWrapper;
use push_block_env::simulation::{SimulationConfig, SimulationHandle, PUSH_BLOCK_SCENE};
use ql::learn::self_driving_q_learner::{Parameter, SelfDrivingQLearner};
use ql::prelude::QlError;
use ql::util::log::init_logging;

const BATCH_SIZE: usize = 32;
/// Fixed training budget in environment interaction steps
const TOTAL_TRAINING_STEPS: usize = 100_000;
/// The learned policy ends up here (the model serializer appends its own extension)
const MODEL_OUTPUT_FILE: &str = "ppo_unity_agent";

fn parameter() -> Parameter {
    let mut param = Parameter::default();
    param.gamma = 0.95;
    // episode length is capped by the scene itself
    param.max_steps_per_episode = usize::MAX;
    param.history_buffer_len = 100_000;
    param.epsilon_pure_random_steps = 5_000;
    param.epsilon_greedy_steps = 50_000.0;
    param.update_target_network_after_num_steps = 2_000;
    param.episode_reward_history_buffer_len = 100;
    param.stats_after_steps = 5_000;
    param
}

fn main() -> Result<()> {
    init_logging();

    let handle = SimulationHandle::launch(SimulationConfig::new(PUSH_BLOCK_SCENE, true))?;
    let environment = Arc::new(RwLock::new(GymWrapper::new(handle)));

    let model_init = || Ok(QLearningBurnModel::<GymWrapper, _, BATCH_SIZE>::init(adam_optimizer()));
    // scratch location for syncing the stabilized network
    let sync_dir = tempfile::tempdir()?;
    let checkpoint_file = sync_dir.path().join("push_block_dqn_target_sync");

    let mut learner =
        SelfDrivingQLearner::new(Arc::clone(&environment), parameter(), model_init, checkpoint_file)?;
    learner.learn_until_step_limit(TOTAL_TRAINING_STEPS)?;

    let written = learner.save_model(MODEL_OUTPUT_FILE)?;
    log::info!(
        "training finished after {} steps / {} episodes, model written to '{}'",
        learner.step_count(),
        learner.episode_count(),
        written
    );
    drop(learner);

    let gym_env = Arc::try_unwrap(environment)
        .map_err(|_| QlError::from("environment is still shared after training"))?;
    let mut gym_env = gym_env.into_inner().unwrap();
    gym_env.close()?;
    gym_env.into_handle().close()?;
    Ok(())
}
