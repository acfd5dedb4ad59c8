use std::path::Path;

use anyhow::Result;

use ql::prelude::QlError;

use crate::push_block::mechanics::{PushBlockAction, PushBlockMechanics, PushBlockState};

/// Scene path understood by [SimulationHandle::launch]
pub const PUSH_BLOCK_SCENE: &str = "./push-block";

/// The entire configuration surface of a simulation:
/// which scene to load and whether graphical rendering is enabled.
pub struct SimulationConfig {
    pub file_name: String,
    pub no_graphics: bool,
}

impl SimulationConfig {
    pub fn new(
        file_name: &str,
        no_graphics: bool,
    ) -> Self {
        Self {
            file_name: file_name.to_string(),
            no_graphics,
        }
    }
}

enum Scene {
    PushBlock(PushBlockMechanics),
}

/// Handle of a running simulation scene.
///
/// The handle exclusively owns the scene. [SimulationHandle::close] releases it
/// exactly once; any operation on a closed handle (a second close included)
/// fails. A handle dropped while still open releases the scene itself.
pub struct SimulationHandle {
    scene_name: String,
    no_graphics: bool,
    scene: Option<Scene>,
}

impl SimulationHandle {
    pub fn launch(config: SimulationConfig) -> Result<Self> {
        let scene = match Path::new(&config.file_name).file_stem().and_then(|s| s.to_str()) {
            Some("push-block") => Scene::PushBlock(PushBlockMechanics::new()),
            _ => return Err(QlError(format!("no scene found for file_name '{}'", config.file_name)).into()),
        };
        log::info!(
            "launched simulation scene '{}' (no_graphics: {})",
            config.file_name,
            config.no_graphics
        );
        Ok(Self {
            scene_name: config.file_name,
            no_graphics: config.no_graphics,
            scene: Some(scene),
        })
    }

    pub fn scene_name(&self) -> &str { &self.scene_name }

    pub fn graphics_enabled(&self) -> bool { !self.no_graphics }

    pub fn is_closed(&self) -> bool { self.scene.is_none() }

    /// Total reward over an episode at which the loaded scene counts as solved
    pub fn episode_reward_goal_mean(&self) -> f32 { PushBlockMechanics::EPISODE_REWARD_GOAL_MEAN }

    pub fn reset(&mut self) -> Result<()> {
        match self.scene_checked_mut()? {
            Scene::PushBlock(mechanics) => mechanics.reset(),
        }
        Ok(())
    }

    /// Performs one step in the scene's native format
    pub fn step(
        &mut self,
        action: PushBlockAction,
    ) -> Result<(PushBlockState, f32, bool)> {
        match self.scene_checked_mut()? {
            Scene::PushBlock(mechanics) => {
                let (state, reward, done) = mechanics.step(action);
                Ok((state.clone(), reward, done))
            }
        }
    }

    pub fn state(&self) -> Result<&PushBlockState> {
        match self.scene_checked()? {
            Scene::PushBlock(mechanics) => Ok(mechanics.state()),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self.scene.take() {
            Some(_) => {
                log::debug!("simulation scene '{}' released", self.scene_name);
                Ok(())
            }
            None => Err(QlError::from("simulation handle already closed").into()),
        }
    }

    fn scene_checked(&self) -> Result<&Scene> {
        self.scene
            .as_ref()
            .ok_or_else(|| QlError::from("simulation handle already closed").into())
    }

    fn scene_checked_mut(&mut self) -> Result<&mut Scene> {
        self.scene
            .as_mut()
            .ok_or_else(|| QlError::from("simulation handle already closed").into())
    }
}

impl Drop for SimulationHandle {
    fn drop(&mut self) {
        if self.scene.take().is_some() {
            log::debug!("simulation scene '{}' released on drop", self.scene_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_resolves_the_push_block_scene() {
        let handle = SimulationHandle::launch(SimulationConfig::new(PUSH_BLOCK_SCENE, true)).unwrap();
        assert_eq!(handle.scene_name(), "./push-block");
        assert!(!handle.graphics_enabled());
        assert!(!handle.is_closed());
    }

    #[test]
    fn launch_fails_for_unknown_scene() {
        let result = SimulationHandle::launch(SimulationConfig::new("./lunar-lander", true));
        assert!(result.is_err());
    }

    #[test]
    fn operations_after_close_fail() {
        let mut handle = SimulationHandle::launch(SimulationConfig::new(PUSH_BLOCK_SCENE, true)).unwrap();
        handle.reset().unwrap();
        handle.close().unwrap();

        assert!(handle.is_closed());
        assert!(handle.reset().is_err());
        assert!(handle.step(PushBlockAction::North).is_err());
        assert!(handle.state().is_err());
        // a second close fails as well instead of silently succeeding
        assert!(handle.close().is_err());
    }

    #[test]
    fn native_step_reports_reward_and_done() {
        let mut handle = SimulationHandle::launch(SimulationConfig::new(PUSH_BLOCK_SCENE, true)).unwrap();
        let (state, reward, done) = handle.step(PushBlockAction::Nothing).unwrap();
        assert_eq!(state.steps(), 1);
        assert!(reward < 0.0);
        assert!(!done);
    }
}
