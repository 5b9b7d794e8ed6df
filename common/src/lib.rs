pub mod config;
pub mod errors;
pub mod util;

pub use errors::{AppError, AppResult};

// 全局使用的ID类型，方便更改和统一类型
pub type UserId = String;
pub type GroupId = String;
