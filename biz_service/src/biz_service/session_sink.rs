use crate::entitys::message_entity::{MessageEnvelope, UndeliverableNotice};
use crate::entitys::user_entity::PresenceStatus;
use crate::manager::common::{ConnectionId, UserId};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection not found")]
    ConnectionNotFound,
    #[error("encode failed: {0}")]
    EncodeFailed(#[from] prost::EncodeError),
    #[error("channel closed")]
    ChannelClosed,
}

/// 出站接口，由会话网关实现；返回 Ok 视为该连接已确认接收
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// 投递消息到指定连接
    async fn deliver(&self, conn_id: &ConnectionId, envelope: &MessageEnvelope) -> Result<(), SendError>;
    /// 通知指定连接：某好友在线状态变化
    async fn presence_changed(&self, conn_id: &ConnectionId, uid: &UserId, status: PresenceStatus) -> Result<(), SendError>;
    /// 通知发送人的连接：消息投递失败
    async fn undeliverable(&self, conn_id: &ConnectionId, notice: &UndeliverableNotice) -> Result<(), SendError>;
}
