pub mod friend_edge;
pub mod group_entity;
pub mod message_entity;
pub mod recommend_entity;
pub mod user_entity;
