use crate::errors::AppError;
use uuid::Uuid;

pub const MAX_ID_LEN: usize = 64;

pub fn build_uuid() -> String {
    format!("{}", Uuid::new_v4().simple())
}

/// 校验外部传入的用户/群组 ID：非空、无空白字符、长度受限
pub fn validate_id(kind: &str, value: &str) -> Result<(), AppError> {
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is empty", kind)));
    }
    if value.len() > MAX_ID_LEN {
        return Err(AppError::Validation(format!("{} longer than {} bytes", kind, MAX_ID_LEN)));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AppError::Validation(format!("{} contains whitespace", kind)));
    }
    Ok(())
}
