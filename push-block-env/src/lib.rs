pub mod gym_wrapper;
pub mod push_block;
pub mod simulation;
