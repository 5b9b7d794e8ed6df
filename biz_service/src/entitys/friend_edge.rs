use crate::manager::common::{PairKey, UserId};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FriendStatus {
    Pending,  // 待验证
    Accepted, // 已添加
    Blocked,  // 已拉黑
    Removed,  // 已删除（保留审计记录）
}

/// 好友关系状态变更记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeTransition {
    pub from: Option<FriendStatus>, // 变更前状态，新建时为空
    pub to: FriendStatus,           // 变更后状态
    pub by: UserId,                 // 操作人
    pub at: i64,                    // 变更时间（毫秒）
}

/// 好友关系：每个无序用户对至多一条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendEdge {
    pub key: PairKey,                   // 无序用户对
    pub requester: UserId,              // 当前申请的发起人
    pub status: FriendStatus,           // 当前状态
    pub blocked_by: Option<UserId>,     // 拉黑操作人
    pub created_at: i64,                // 创建时间（毫秒）
    pub accepted_at: Option<i64>,       // 通过时间（毫秒）
    pub updated_at: i64,                // 最后更新时间（毫秒）
    pub history: Vec<EdgeTransition>,   // 状态变更审计
}

impl FriendEdge {
    /// 新建关系记录，`by` 为发起人（申请人或拉黑人）
    pub fn new(by: &str, other: &str, status: FriendStatus, now: i64) -> Self {
        Self {
            key: PairKey::new(by, other),
            requester: by.to_string(),
            status,
            blocked_by: (status == FriendStatus::Blocked).then(|| by.to_string()),
            created_at: now,
            accepted_at: None,
            updated_at: now,
            history: vec![EdgeTransition { from: None, to: status, by: by.to_string(), at: now }],
        }
    }

    /// 申请的接收方
    pub fn addressee(&self) -> &UserId {
        self.key.other(&self.requester).unwrap_or(&self.key.b)
    }

    /// removed 以外的状态都视为存在
    pub fn is_active(&self) -> bool {
        self.status != FriendStatus::Removed
    }

    pub fn transition(&mut self, to: FriendStatus, by: &str, now: i64) {
        self.history.push(EdgeTransition { from: Some(self.status), to, by: by.to_string(), at: now });
        self.status = to;
        self.updated_at = now;
        match to {
            FriendStatus::Accepted => self.accepted_at = Some(now),
            FriendStatus::Blocked => self.blocked_by = Some(by.to_string()),
            FriendStatus::Pending => {
                self.requester = by.to_string();
                self.accepted_at = None;
                self.blocked_by = None;
            }
            FriendStatus::Removed => self.blocked_by = None,
        }
    }
}
