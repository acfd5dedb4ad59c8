use std::rc::Rc;

use anyhow::Result;
use console_engine::pixel;
use console_engine::screen::Screen;
use rustc_hash::FxHashMap;

use ql::prelude::{Action, DebugVisualizer, Environment, ModelActionType, QlError, State};

use crate::push_block::mechanics::{PushBlockAction, PushBlockState, FIELD_SIZE, GOAL_ROW};
use crate::simulation::SimulationHandle;

const CHANNEL_AGENT: usize = 0;
const CHANNEL_BLOCK: usize = 1;
const CHANNEL_GOAL: usize = 2;
const NUM_CHANNELS: usize = 3;

/// Flattened one-hot encoding of a scene state: one channel each for
/// agent, block and goal zone over the 5x5 field.
#[derive(Clone, Debug, PartialEq)]
pub struct GymObservation {
    data: Vec<f32>,
}

impl GymObservation {
    fn zeroed() -> Self {
        Self {
            data: vec![0.0; Self::SIZE],
        }
    }

    fn from_scene_state(state: &PushBlockState) -> Self {
        let mut data = vec![0.0; Self::SIZE];
        data[feature_index(state.agent_coord(), CHANNEL_AGENT)] = 1.0;
        data[feature_index(state.block_coord(), CHANNEL_BLOCK)] = 1.0;
        for x in 0..FIELD_SIZE {
            data[feature_index((x, GOAL_ROW), CHANNEL_GOAL)] = 1.0;
        }
        Self { data }
    }

    fn locate_channel(
        &self,
        channel: usize,
    ) -> Option<(usize, usize)> {
        (0..FIELD_SIZE)
            .flat_map(|y| (0..FIELD_SIZE).map(move |x| (x, y)))
            .find(|&coord| self.data[feature_index(coord, channel)] > 0.5)
    }
}

fn feature_index(
    coord: (usize, usize),
    channel: usize,
) -> usize {
    (coord.1 * FIELD_SIZE + coord.0) * NUM_CHANNELS + channel
}

impl State for GymObservation {
    const SIZE: usize = FIELD_SIZE * FIELD_SIZE * NUM_CHANNELS;

    fn as_features(&self) -> &[f32] { &self.data }
}

impl DebugVisualizer for GymObservation {
    fn one_line_info(&self) -> String {
        format!(
            "GymObservation[{}]: agent: {:?}, block: {:?}",
            Self::SIZE,
            self.locate_channel(CHANNEL_AGENT),
            self.locate_channel(CHANNEL_BLOCK)
        )
    }

    fn render_to_console(&self) -> Screen {
        let mut screen = Screen::new_fill(FIELD_SIZE as u32, FIELD_SIZE as u32, pixel::pxl(' '));
        for x in 0..FIELD_SIZE {
            screen.set_pxl(x as i32, GOAL_ROW as i32, pixel::pxl('□'));
        }
        if let Some((x, y)) = self.locate_channel(CHANNEL_BLOCK) {
            screen.set_pxl(x as i32, y as i32, pixel::pxl('■'));
        }
        if let Some((x, y)) = self.locate_channel(CHANNEL_AGENT) {
            screen.set_pxl(x as i32, y as i32, pixel::pxl('●'));
        }
        screen
    }
}

/// Result of one [GymWrapper::step] call
pub struct GymStep {
    pub observation: GymObservation,
    pub reward: f32,
    pub done: bool,
    pub info: FxHashMap<String, String>,
}

/// Adapter translating the simulation's native step/observation format into
/// the standard (reset, step, observation, reward, done, info) interface.
///
/// Takes exclusive ownership of the [SimulationHandle] it wraps. After
/// [GymWrapper::close] every operation fails; [GymWrapper::into_handle] hands
/// the underlying handle back so the caller can release it second, in the
/// documented order.
pub struct GymWrapper {
    handle: SimulationHandle,
    last_observation: GymObservation,
    closed: bool,
}

impl GymWrapper {
    pub fn new(handle: SimulationHandle) -> Self {
        Self {
            handle,
            last_observation: GymObservation::zeroed(),
            closed: false,
        }
    }

    pub fn action_space(&self) -> ModelActionType { PushBlockAction::ACTION_SPACE }

    /// Starts a fresh episode and returns the initial observation
    pub fn reset(&mut self) -> Result<GymObservation> {
        self.ensure_open()?;
        self.handle.reset()?;
        let observation = GymObservation::from_scene_state(self.handle.state()?);
        self.last_observation = observation.clone();
        Ok(observation)
    }

    /// Applies the given discrete action and returns next observation,
    /// immediate reward, done flag and auxiliary info.
    pub fn step(
        &mut self,
        action: ModelActionType,
    ) -> Result<GymStep> {
        self.ensure_open()?;
        let native_action = PushBlockAction::try_from_numeric(action)?;
        let (state, reward, done) = self.handle.step(native_action)?;

        let observation = GymObservation::from_scene_state(&state);
        self.last_observation = observation.clone();

        let mut info = FxHashMap::default();
        info.insert("steps".to_string(), state.steps().to_string());
        info.insert("block_in_goal".to_string(), state.block_in_goal().to_string());

        Ok(GymStep {
            observation,
            reward,
            done,
            info,
        })
    }

    /// Draws the current scene to the console - a no-op when the handle was
    /// launched with `no_graphics`
    pub fn render(&self) -> Result<()> {
        self.ensure_open()?;
        if self.handle.graphics_enabled() {
            self.handle.state()?.render_to_console().draw();
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        Ok(())
    }

    /// Hands the wrapped handle back for the final release step
    pub fn into_handle(self) -> SimulationHandle { self.handle }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(QlError::from("gym wrapper already closed").into())
        } else {
            Ok(())
        }
    }
}

/// Binds the wrapper to the learner contract
impl Environment for GymWrapper {
    type S = GymObservation;
    type A = PushBlockAction;

    fn reset(&mut self) -> Result<()> {
        GymWrapper::reset(self)?;
        Ok(())
    }

    fn state(&self) -> &GymObservation { &self.last_observation }

    fn step(
        &mut self,
        action: PushBlockAction,
    ) -> Result<(Rc<GymObservation>, f32, bool)> {
        let step = GymWrapper::step(self, action.numeric())?;
        Ok((Rc::new(step.observation), step.reward, step.done))
    }

    fn episode_reward_goal_mean(&self) -> f32 { self.handle.episode_reward_goal_mean() }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::simulation::{SimulationConfig, PUSH_BLOCK_SCENE};

    use super::*;

    fn wrapper() -> GymWrapper {
        let handle = SimulationHandle::launch(SimulationConfig::new(PUSH_BLOCK_SCENE, true)).unwrap();
        GymWrapper::new(handle)
    }

    #[test]
    fn reset_delivers_consistently_shaped_observations() {
        let mut gym_env = wrapper();
        let observation = gym_env.reset().unwrap();

        assert_eq!(observation.as_features().len(), GymObservation::SIZE);
        assert!(observation.as_features().iter().any(|&v| v > 0.0));

        let step = gym_env.step(0).unwrap();
        assert_eq!(step.observation.as_features().len(), observation.as_features().len());
    }

    #[test]
    fn step_returns_observation_reward_done_info() {
        let mut gym_env = wrapper();
        gym_env.reset().unwrap();

        let GymStep {
            observation,
            reward,
            done,
            info,
        } = gym_env.step(4).unwrap();

        assert_eq!(observation.locate_channel(CHANNEL_GOAL), Some((0, GOAL_ROW)));
        assert!(reward < 0.0);
        assert!(!done);
        assert_eq!(info.get("steps").map(String::as_str), Some("1"));
        assert_eq!(info.get("block_in_goal").map(String::as_str), Some("false"));
    }

    #[test]
    fn observation_encodes_agent_and_block_positions() {
        let mut gym_env = wrapper();
        let observation = gym_env.reset().unwrap();

        let agent = observation.locate_channel(CHANNEL_AGENT).unwrap();
        let block = observation.locate_channel(CHANNEL_BLOCK).unwrap();
        assert_eq!(agent.1, FIELD_SIZE - 1);
        assert!((1..FIELD_SIZE - 1).contains(&block.1));
    }

    #[rstest]
    #[case(5)]
    #[case(42)]
    fn step_with_action_out_of_space_fails(#[case] action: ModelActionType) {
        let mut gym_env = wrapper();
        gym_env.reset().unwrap();
        assert!(gym_env.step(action).is_err());
    }

    #[test]
    fn operations_after_close_fail() {
        let mut gym_env = wrapper();
        gym_env.reset().unwrap();
        gym_env.close().unwrap();

        assert!(gym_env.reset().is_err());
        assert!(gym_env.step(0).is_err());
        assert!(gym_env.render().is_err());
        assert!(gym_env.close().is_err());
    }

    #[test]
    fn documented_release_order_works() {
        let mut gym_env = wrapper();
        gym_env.reset().unwrap();

        gym_env.close().unwrap();
        let mut handle = gym_env.into_handle();
        handle.close().unwrap();
        assert!(handle.is_closed());
    }

    #[test]
    fn environment_trait_drives_the_gym_surface() {
        let mut gym_env = wrapper();
        Environment::reset(&mut gym_env).unwrap();

        let initial = gym_env.state_as_rc();
        let (next, reward, _done) = Environment::step(&mut gym_env, PushBlockAction::Nothing).unwrap();
        assert_eq!(initial.as_features().len(), next.as_features().len());
        assert!(reward < 0.0);
        assert_eq!(*gym_env.state_as_rc(), *next);
    }
}
