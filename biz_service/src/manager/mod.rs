pub mod common;
pub mod friend_graph;
pub mod group_manager;
pub mod job_manager;
pub mod presence_manager;
pub mod user_manager;
