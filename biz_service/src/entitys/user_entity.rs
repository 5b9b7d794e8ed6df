use crate::manager::common::UserId;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// 用户基础信息（账号由外部系统开通）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub uid: UserId,           // 用户 ID
    pub display_name: String,  // 展示名称
    pub created_at: i64,       // 登记时间（秒）
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    #[default]
    Offline,
    Online,
    Away,
}

/// 在线状态变更事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEvent {
    pub uid: UserId,
    pub status: PresenceStatus,
    pub at: i64,
}

/// 好友列表视图
#[derive(Debug, Clone, Serialize)]
pub struct FriendView {
    pub uid: UserId,
    pub display_name: String,
    pub status: PresenceStatus,
    pub since: Option<i64>,
}
