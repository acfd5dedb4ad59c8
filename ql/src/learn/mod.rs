pub mod replay_buffer;
pub mod self_driving_q_learner;
