use crate::entitys::group_entity::GroupInfo;
use crate::manager::common::{GroupId, UserId};
use common::util::common_utils::{build_uuid, validate_id};
use common::util::date_util::now;
use common::{AppError, AppResult};
use dashmap::{DashMap, DashSet};
use log::info;
use std::collections::HashSet;

/// 群组成员管理，仅负责成员关系，群消息投递复用单聊的按接收人路由
pub trait GroupManagerOpt: Send + Sync {
    /// 创建群组，群主自动成为成员
    /// # owner: 群主
    /// # name: 群名称
    fn create_group(&self, owner: &UserId, name: &str) -> AppResult<GroupInfo>;
    ///获取群组信息
    /// # group_id: 群组ID
    fn get_group(&self, group_id: &str) -> Option<GroupInfo>;
    /// 添加成员，返回是否新加入
    /// # group_id: 群组ID
    /// # uid: 用户ID
    /// 成员索引与 `members` 在同一把群组锁内更新，锁顺序为 `groups` -> `user_to_groups`
    fn add_member(&self, group_id: &str, uid: &UserId) -> AppResult<bool>;

    fn remove_member(&self, group_id: &str, uid: &UserId) -> AppResult<bool>;

    fn members(&self, group_id: &str) -> AppResult<Vec<UserId>>;
    /// 判断用户是否在群组中
    fn is_member(&self, group_id: &str, uid: &str) -> bool;
    /// 用户所在的群组
    fn user_groups(&self, uid: &str) -> Vec<GroupId>;
}

#[derive(Debug, Default)]
pub struct GroupManager {
    groups: DashMap<GroupId, GroupInfo>,
    user_to_groups: DashMap<UserId, DashSet<GroupId>>,
}

impl GroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(group_id: &str) -> AppError {
        AppError::NotFound(format!("group {}", group_id))
    }
}

impl GroupManagerOpt for GroupManager {
    fn create_group(&self, owner: &UserId, name: &str) -> AppResult<GroupInfo> {
        validate_id("owner", owner)?;
        if name.trim().is_empty() {
            return Err(AppError::Validation("group name is empty".to_string()));
        }
        let group = GroupInfo {
            id: build_uuid(),
            name: name.trim().to_string(),
            owner: owner.clone(),
            members: HashSet::from([owner.clone()]),
            created_at: now(),
        };
        self.groups.insert(group.id.clone(), group.clone());
        self.user_to_groups.entry(owner.clone()).or_default().insert(group.id.clone());
        info!("👥 创建群组: {} ({}) owner={}", group.name, group.id, owner);
        Ok(group)
    }

    fn get_group(&self, group_id: &str) -> Option<GroupInfo> {
        self.groups.get(group_id).map(|g| g.clone())
    }

    fn add_member(&self, group_id: &str, uid: &UserId) -> AppResult<bool> {
        validate_id("uid", uid)?;
        let added = {
            let mut group = self.groups.get_mut(group_id).ok_or_else(|| Self::not_found(group_id))?;
            group.members.insert(uid.clone())
        };
        if added {
            self.user_to_groups.entry(uid.clone()).or_default().insert(group_id.to_string());
            info!("👥 加入群组: {} <- {}", group_id, uid);
        }
        Ok(added)
    }

    fn remove_member(&self, group_id: &str, uid: &UserId) -> AppResult<bool> {
        let removed = {
            let mut group = self.groups.get_mut(group_id).ok_or_else(|| Self::not_found(group_id))?;
            if group.owner == *uid {
                return Err(AppError::Validation(format!("owner cannot leave group {}", group_id)));
            }
            group.members.remove(uid)
        };
        if removed {
            if let Some(groups) = self.user_to_groups.get(uid) {
                groups.remove(group_id);
            }
            info!("👋 退出群组: {} -> {}", group_id, uid);
        }
        Ok(removed)
    }

    fn members(&self, group_id: &str) -> AppResult<Vec<UserId>> {
        let group = self.groups.get(group_id).ok_or_else(|| Self::not_found(group_id))?;
        let mut members: Vec<UserId> = group.members.iter().cloned().collect();
        members.sort();
        Ok(members)
    }

    fn is_member(&self, group_id: &str, uid: &str) -> bool {
        self.groups.get(group_id).is_some_and(|g| g.members.contains(uid))
    }

    fn user_groups(&self, uid: &str) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self.user_to_groups.get(uid).map(|set| set.iter().map(|g| g.key().clone()).collect()).unwrap_or_default();
        groups.sort();
        groups
    }
}
