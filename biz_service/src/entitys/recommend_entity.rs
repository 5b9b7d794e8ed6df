use crate::manager::common::UserId;
use serde::Serialize;

/// 好友推荐结果，派生数据，仅缓存不落库
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecommendationEntry {
    pub for_user: UserId,
    pub candidate: UserId,
    /// 评分 = 共同好友数
    pub score: u32,
    pub shared_friend_count: u32,
}
