use std::fmt::{Display, Formatter};

use anyhow::Result;
use console_engine::pixel;
use console_engine::screen::Screen;
use rand::prelude::ThreadRng;
use rand::Rng;

use ql::prelude::{Action, DebugVisualizer, ModelActionType, QlError};

/// Quadratic field edge length
pub const FIELD_SIZE: usize = 5;
/// The whole north row is the goal zone
pub const GOAL_ROW: usize = 0;
const MAX_STEPS: usize = 40;

const REWARD_GOAL: f32 = 10.0;
const REWARD_TIMEOUT: f32 = -10.0;
const REWARD_STEP: f32 = -0.02;
const REWARD_ILLEGAL_MOVE: f32 = -1.0;

/// The push-block scene.
///
/// 5x5 field (y=0 north / y=4 south). The north row is the goal zone.
/// - One agent - starts on a random column of the south row
/// - One block - starts on a random cell of the three middle rows
///
/// Per step the agent may move one cell into one of the four directions (or hold).
/// Moving onto the block pushes the block one cell further in the same direction;
/// a push with no room behind the block is an illegal move, as is walking out of
/// the field. The scene is done when the block enters the goal row - or, without
/// success, when the step limit is reached.
pub struct PushBlockMechanics {
    state: PushBlockState,
    rng: ThreadRng,
}

impl PushBlockMechanics {
    /// Average episode reward at which the task counts as solved
    pub const EPISODE_REWARD_GOAL_MEAN: f32 = 9.0;

    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            state: PushBlockState::random_initial_state(&mut rng),
            rng,
        }
    }

    pub fn reset(&mut self) { self.state = PushBlockState::random_initial_state(&mut self.rng); }

    pub fn state(&self) -> &PushBlockState { &self.state }

    /// Performs one native scene step.
    ///
    /// Returns the new state, the immediate reward and the done flag.
    pub fn step(
        &mut self,
        action: PushBlockAction,
    ) -> (&PushBlockState, f32, bool) {
        let r = self.state.do_move(action);

        if let MoveResult::Legal { done: true } = r {
            (self.state(), REWARD_GOAL, true)
        } else if self.state.steps >= MAX_STEPS {
            (self.state(), REWARD_TIMEOUT, true)
        } else if let MoveResult::Legal { done: false } = r {
            (self.state(), REWARD_STEP, false)
        } else {
            (self.state(), REWARD_ILLEGAL_MOVE, false)
        }
    }
}

impl Default for PushBlockMechanics {
    fn default() -> Self { PushBlockMechanics::new() }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PushBlockState {
    /// (x, y)
    agent_coord: (usize, usize),
    block_coord: (usize, usize),
    steps: usize,
}

impl PushBlockState {
    fn random_initial_state(rng: &mut ThreadRng) -> Self {
        let agent_coord = (rng.gen_range(0..FIELD_SIZE), FIELD_SIZE - 1);
        let block_coord = (rng.gen_range(0..FIELD_SIZE), rng.gen_range(1..FIELD_SIZE - 1));
        PushBlockState {
            agent_coord,
            block_coord,
            steps: 0,
        }
    }

    pub fn agent_coord(&self) -> (usize, usize) { self.agent_coord }

    pub fn block_coord(&self) -> (usize, usize) { self.block_coord }

    pub fn steps(&self) -> usize { self.steps }

    pub fn block_in_goal(&self) -> bool { self.block_coord.1 == GOAL_ROW }

    fn do_move(
        &mut self,
        action: PushBlockAction,
    ) -> MoveResult {
        self.steps += 1;

        let delta = match action {
            PushBlockAction::Nothing => return MoveResult::Legal { done: false },
            directional => directional.delta(),
        };

        let agent_target = match shifted(self.agent_coord, delta) {
            Some(c) => c,
            None => return MoveResult::Illegal,
        };

        if agent_target == self.block_coord {
            // pushing - the block needs room behind it
            match shifted(self.block_coord, delta) {
                None => MoveResult::Illegal,
                Some(block_target) => {
                    self.block_coord = block_target;
                    self.agent_coord = agent_target;
                    MoveResult::Legal { done: self.block_in_goal() }
                }
            }
        } else {
            self.agent_coord = agent_target;
            MoveResult::Legal { done: false }
        }
    }

    #[cfg(test)]
    pub fn test_state(
        agent_coord: (usize, usize),
        block_coord: (usize, usize),
    ) -> Self {
        assert_ne!(agent_coord, block_coord);
        PushBlockState {
            agent_coord,
            block_coord,
            steps: 0,
        }
    }
}

/// One cell into `delta` direction, or [None] when leaving the field
fn shifted(
    coord: (usize, usize),
    delta: (isize, isize),
) -> Option<(usize, usize)> {
    let x = coord.0 as isize + delta.0;
    let y = coord.1 as isize + delta.1;
    let range = 0..FIELD_SIZE as isize;
    if range.contains(&x) && range.contains(&y) {
        Some((x as usize, y as usize))
    } else {
        None
    }
}

enum MoveResult {
    Illegal,
    Legal { done: bool },
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum PushBlockAction {
    West,
    North,
    East,
    South,
    Nothing,
}

impl PushBlockAction {
    fn delta(&self) -> (isize, isize) {
        match self {
            PushBlockAction::West => (-1, 0),
            PushBlockAction::North => (0, -1),
            PushBlockAction::East => (1, 0),
            PushBlockAction::South => (0, 1),
            PushBlockAction::Nothing => (0, 0),
        }
    }
}

impl Display for PushBlockAction {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            PushBlockAction::West => f.write_str("←"),
            PushBlockAction::North => f.write_str("↑"),
            PushBlockAction::East => f.write_str("→"),
            PushBlockAction::South => f.write_str("↓"),
            PushBlockAction::Nothing => f.write_str("o"),
        }
    }
}

impl Action for PushBlockAction {
    const ACTION_SPACE: ModelActionType = 5;

    fn numeric(&self) -> ModelActionType {
        use PushBlockAction::*;
        match self {
            West => 0,
            North => 1,
            East => 2,
            South => 3,
            Nothing => 4,
        }
    }

    fn try_from_numeric(value: ModelActionType) -> Result<Self> {
        use PushBlockAction::*;
        match value {
            0 => Ok(West),
            1 => Ok(North),
            2 => Ok(East),
            3 => Ok(South),
            4 => Ok(Nothing),
            _ => Err(QlError(format!("value {} out of range", value)).into()),
        }
    }
}

impl DebugVisualizer for PushBlockState {
    fn one_line_info(&self) -> String {
        // rows remaining until the block enters the goal zone
        let distance = self.block_coord.1 - GOAL_ROW;
        format!(
            "PushBlockField: agent: ({},{}), block: ({},{}), block-goal-distance: {}",
            self.agent_coord.0, self.agent_coord.1, self.block_coord.0, self.block_coord.1, distance
        )
    }

    fn render_to_console(&self) -> Screen {
        let mut screen = Screen::new_fill(FIELD_SIZE as u32, FIELD_SIZE as u32, pixel::pxl(' '));
        for x in 0..FIELD_SIZE {
            screen.set_pxl(x as i32, GOAL_ROW as i32, pixel::pxl('□'));
        }
        screen.set_pxl(self.block_coord.0 as i32, self.block_coord.1 as i32, pixel::pxl('■'));
        screen.set_pxl(self.agent_coord.0 as i32, self.agent_coord.1 as i32, pixel::pxl('●'));
        screen
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn mechanics_with(state: PushBlockState) -> PushBlockMechanics {
        PushBlockMechanics {
            state,
            rng: rand::thread_rng(),
        }
    }

    #[test]
    fn initial_state_layout() {
        let mut env = PushBlockMechanics::new();
        for _ in 0..100 {
            env.reset();
            let state = env.state();
            assert_eq!(state.agent_coord().1, FIELD_SIZE - 1);
            assert!((1..FIELD_SIZE - 1).contains(&state.block_coord().1));
            assert_eq!(state.steps(), 0);
            assert!(!state.block_in_goal());
        }
    }

    #[test]
    fn plain_move_earns_step_reward() {
        let mut env = mechanics_with(PushBlockState::test_state((2, 4), (2, 2)));
        let (state, reward, done) = env.step(PushBlockAction::West);
        assert_eq!(state.agent_coord(), (1, 4));
        assert_eq!(reward, REWARD_STEP);
        assert!(!done);
    }

    #[test]
    fn push_moves_block_and_agent() {
        let mut env = mechanics_with(PushBlockState::test_state((2, 3), (2, 2)));
        let (state, reward, done) = env.step(PushBlockAction::North);
        assert_eq!(state.block_coord(), (2, 1));
        assert_eq!(state.agent_coord(), (2, 2));
        assert_eq!(reward, REWARD_STEP);
        assert!(!done);
    }

    #[test]
    fn pushing_block_into_goal_row_finishes_the_scene() {
        let mut env = mechanics_with(PushBlockState::test_state((3, 2), (3, 1)));
        let (state, reward, done) = env.step(PushBlockAction::North);
        assert!(state.block_in_goal());
        assert_eq!(reward, REWARD_GOAL);
        assert!(done);
    }

    #[rstest]
    #[case((0, 4), PushBlockAction::West)]
    #[case((4, 4), PushBlockAction::East)]
    #[case((2, 4), PushBlockAction::South)]
    fn walking_out_of_the_field_is_illegal(
        #[case] agent_coord: (usize, usize),
        #[case] action: PushBlockAction,
    ) {
        let mut env = mechanics_with(PushBlockState::test_state(agent_coord, (2, 2)));
        let (state, reward, done) = env.step(action);
        assert_eq!(state.agent_coord(), agent_coord);
        assert_eq!(reward, REWARD_ILLEGAL_MOVE);
        assert!(!done);
    }

    #[test]
    fn push_without_room_behind_the_block_is_illegal() {
        let mut env = mechanics_with(PushBlockState::test_state((1, 1), (0, 1)));
        let (state, reward, done) = env.step(PushBlockAction::West);
        assert_eq!(state.agent_coord(), (1, 1));
        assert_eq!(state.block_coord(), (0, 1));
        assert_eq!(reward, REWARD_ILLEGAL_MOVE);
        assert!(!done);
    }

    #[test]
    fn nothing_keeps_positions() {
        let mut env = mechanics_with(PushBlockState::test_state((2, 4), (2, 2)));
        let (state, reward, done) = env.step(PushBlockAction::Nothing);
        assert_eq!(state.agent_coord(), (2, 4));
        assert_eq!(state.block_coord(), (2, 2));
        assert_eq!(reward, REWARD_STEP);
        assert!(!done);
    }

    #[test]
    fn scene_times_out_with_negative_reward() {
        let mut env = mechanics_with(PushBlockState::test_state((2, 4), (2, 2)));
        let mut result = None;
        for _ in 0..MAX_STEPS {
            let (_, reward, done) = env.step(PushBlockAction::Nothing);
            result = Some((reward, done));
        }
        assert_eq!(result, Some((REWARD_TIMEOUT, true)));
        assert_eq!(env.state().steps(), MAX_STEPS);
    }

    #[test]
    fn action_numeric_roundtrip() {
        for v in 0..PushBlockAction::ACTION_SPACE {
            let action = PushBlockAction::try_from_numeric(v).unwrap();
            assert_eq!(action.numeric(), v);
        }
        assert!(PushBlockAction::try_from_numeric(PushBlockAction::ACTION_SPACE).is_err());
    }
}
