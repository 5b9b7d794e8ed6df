use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// 全局使用的ID类型，方便更改和统一类型
pub use common::{GroupId, UserId};

/// 客户端连接唯一标识
#[derive(Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub String);

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        ConnectionId(value)
    }
}
impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        ConnectionId(value.to_string())
    }
}
impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    #[default]
    Unknown = 0,
    Mobile = 1,
    Desktop = 2,
    Web = 3,
}
impl From<u8> for DeviceType {
    fn from(value: u8) -> Self {
        match value {
            1 => DeviceType::Mobile,
            2 => DeviceType::Desktop,
            3 => DeviceType::Web,
            _ => DeviceType::Unknown,
        }
    }
}
impl From<i32> for DeviceType {
    fn from(value: i32) -> Self {
        u8::try_from(value).map(DeviceType::from).unwrap_or(DeviceType::Unknown)
    }
}

impl FromStr for DeviceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mobile" => Ok(DeviceType::Mobile),
            "desktop" => Ok(DeviceType::Desktop),
            "web" => Ok(DeviceType::Web),
            _ => Err(()),
        }
    }
}

/// 无序用户对，`a <= b`，作为好友关系与单聊会话的主键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub a: UserId,
    pub b: UserId,
}

impl PairKey {
    pub fn new(x: &str, y: &str) -> Self {
        if x <= y {
            Self { a: x.to_string(), b: y.to_string() }
        } else {
            Self { a: y.to_string(), b: x.to_string() }
        }
    }

    /// 返回另一端用户；`uid` 不在该对中时返回 None
    pub fn other(&self, uid: &str) -> Option<&UserId> {
        if self.a == uid {
            Some(&self.b)
        } else if self.b == uid {
            Some(&self.a)
        } else {
            None
        }
    }
}
