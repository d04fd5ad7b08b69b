pub mod question_flow;
pub mod replay_actor;
pub mod replay_guard;
