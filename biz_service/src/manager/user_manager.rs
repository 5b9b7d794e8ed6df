use crate::entitys::user_entity::UserInfo;
use crate::manager::common::UserId;
use common::AppResult;
use common::util::common_utils::validate_id;
use common::util::date_util::now;
use dashmap::DashMap;

/// 用户目录：账号由外部开通，这里只登记展示名称供查询接口使用
#[derive(Debug, Default)]
pub struct UserManager {
    users: DashMap<UserId, UserInfo>,
}

impl UserManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记 / 更新用户展示名称，空名称使用用户 ID
    pub fn provision(&self, uid: &str, display_name: &str) -> AppResult<UserInfo> {
        validate_id("uid", uid)?;
        let display_name = match display_name.trim() {
            "" => uid.to_string(),
            name => name.to_string(),
        };
        let mut entry = self.users.entry(uid.to_string()).or_insert_with(|| UserInfo {
            uid: uid.to_string(),
            display_name: display_name.clone(),
            created_at: now(),
        });
        entry.display_name = display_name;
        Ok(entry.value().clone())
    }

    /// 未登记的用户展示名称默认为 ID
    pub fn display_name(&self, uid: &str) -> String {
        self.users.get(uid).map(|u| u.display_name.clone()).unwrap_or_else(|| uid.to_string())
    }
}
