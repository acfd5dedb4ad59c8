use anyhow::Result;
use push_block_env::gym_wrapper::GymWrapper;
use push_block_env::simulation::{SimulationConfig, SimulationHandle, PUSH_BLOCK_SCENE};
use ql::prelude::DebugVisualizer;
use ql::util::log::init_logging;

/// Drives the push-block simulation through the gym surface one step at a
/// time, with graphics enabled.
fn main() -> Result<()> {
    init_logging();

    let handle = SimulationHandle::launch(SimulationConfig::new(PUSH_BLOCK_SCENE, false))?;
    let mut gym_env = GymWrapper::new(handle);

    let observation = gym_env.reset()?;
    log::info!("reset -> {}", observation.one_line_info());

    let step = gym_env.step(0)?;
    log::info!(
        "step(0) -> {}, reward: {:.2}, done: {}, info: {:?}",
        step.observation.one_line_info(),
        step.reward,
        step.done,
        step.info
    );
    gym_env.render()?;

    gym_env.close()?;
    gym_env.into_handle().close()?;
    Ok(())
}
