use crate::manager::common::{GroupId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: GroupId,                // 群组唯一 ID
    pub name: String,               // 群名称
    pub owner: UserId,              // 群主
    pub members: HashSet<UserId>,   // 成员（包含群主）
    pub created_at: i64,            // 创建时间（秒）
}
