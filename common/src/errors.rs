use crate::UserId;
use log::error;
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    // ==== 好友关系 / 业务错误 ====
    #[error("Invalid friend edge: {0}")]
    InvalidEdge(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Not friends: {sender} -> {recipient}")]
    NotFriends { sender: UserId, recipient: UserId },

    #[error("Not a member of group {group}: {uid}")]
    NotGroupMember { group: String, uid: UserId },

    #[error("Delivery exhausted: message {message_id} (seq {sequence}) after {attempts} attempts")]
    DeliveryExhausted { message_id: String, sequence: u64, attempts: u32 },

    #[error("Bad request: {0}")]
    Validation(String),

    // ==== 系统错误 ====
    #[error("Config error: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl AppError {
    /// 错误码，网关写回客户端的错误帧使用；系统错误同时记录日志
    pub fn code(&self) -> u32 {
        match self {
            AppError::Validation(_) => 400,
            AppError::NotFriends { .. } | AppError::NotGroupMember { .. } => 403,
            AppError::NotFound(_) => 404,
            AppError::InvalidEdge(_) => 409,
            AppError::DeliveryExhausted { .. } => 504,
            e => {
                error!("{:?}", e);
                500
            }
        }
    }

    /// 面向客户端的错误描述，系统错误不暴露细节
    pub fn client_message(&self) -> String {
        match self {
            AppError::Config(_) | AppError::Internal(_) => "Service error".to_string(),
            e => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::InvalidEdge("dup".into()).code(), 409);
        assert_eq!(AppError::NotFound("edge".into()).code(), 404);
        let err = AppError::NotFriends { sender: "a".into(), recipient: "b".into() };
        assert_eq!(err.code(), 403);
        assert_eq!(err.client_message(), "Not friends: a -> b");
        let internal = AppError::from(anyhow::anyhow!("boom"));
        assert_eq!(internal.code(), 500);
        assert_eq!(internal.client_message(), "Service error");
    }
}
