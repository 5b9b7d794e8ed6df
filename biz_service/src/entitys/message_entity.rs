use crate::manager::common::{GroupId, PairKey, UserId};
use bytes::Bytes;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,   // 待投递（在 outbox 中）
    Delivered, // 至少一个连接已确认
    Failed,    // 超出重试预算
}

/// 消息目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTarget {
    User(UserId),
    Group(GroupId),
}

/// 会话主键：单聊按无序用户对，群聊按 (群, 成员) 保存成员自己的消息视图
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Direct(PairKey),
    Group(GroupId, UserId),
}

/// 单条消息，payload 创建后不可变，投递状态只由消息路由修改
#[derive(Debug, Clone)]
pub struct MessageEntity {
    pub message_id: String,         // 服务端消息 ID
    pub sender_id: UserId,          // 发送人
    pub recipient_id: UserId,       // 接收人
    pub group_id: Option<GroupId>,  // 群消息所属群组
    pub payload: Bytes,             // 消息体
    pub client_token: String,       // 客户端生成的去重 token
    pub sequence: u64,              // 按接收人单调递增的序号
    pub status: DeliveryStatus,     // 投递状态
    pub attempts: u32,              // 已投递轮次
    pub sent_at: i64,               // 发送时间（毫秒）
}

impl MessageEntity {
    pub fn envelope(&self) -> MessageEnvelope {
        MessageEnvelope {
            sender_id: self.sender_id.clone(),
            recipient_id: self.recipient_id.clone(),
            group_id: self.group_id.clone(),
            sequence: self.sequence,
            payload: self.payload.clone(),
            sent_at: self.sent_at,
        }
    }

    pub fn receipt(&self) -> SendReceipt {
        SendReceipt {
            message_id: self.message_id.clone(),
            recipient_id: self.recipient_id.clone(),
            sequence: self.sequence,
            status: self.status,
        }
    }

    pub fn conversation_key(&self) -> ConversationKey {
        match &self.group_id {
            Some(group_id) => ConversationKey::Group(group_id.clone(), self.recipient_id.clone()),
            None => ConversationKey::Direct(PairKey::new(&self.sender_id, &self.recipient_id)),
        }
    }
}

/// 下发给客户端的消息信封
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub group_id: Option<GroupId>,
    pub sequence: u64,
    pub payload: Bytes,
    pub sent_at: i64,
}

/// 发送结果回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: String,
    pub recipient_id: UserId,
    pub sequence: u64,
    pub status: DeliveryStatus,
}

/// 投递失败通知，发给发送人的所有在线连接
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndeliverableNotice {
    pub message_id: String,
    pub recipient_id: UserId,
    pub sequence: u64,
    pub client_token: String,
    pub attempts: u32,
    pub reason: String,
}

/// 历史消息分页，`items` 按时间正序，`next_before` 用于继续向前翻页
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub items: Vec<MessageEntity>,
    pub next_before: Option<usize>,
}
