/// ======================================
/// 📡 帧类型：每个帧的第一个字节
/// ======================================
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ByteMessageType {
    UnknownByteMessageType = 0,
    LoginReqMsgType = 1,
    LoginRespMsgType = 2,
    HeartbeatMsgType = 3,
    SendMsgReqType = 4,
    SendMsgRespType = 5,
    MessageEnvelopeMsgType = 6,
    AckMsgType = 7,
    PresenceChangedMsgType = 8,
    UndeliverableMsgType = 9,
    FriendOpReqType = 10,
    FriendOpRespType = 11,
    SetAwayMsgType = 12,
    ErrorRespMsgType = 13,
}

/// 好友操作类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FriendOp {
    UnknownFriendOp = 0,
    Request = 1,
    Accept = 2,
    Reject = 3,
    Remove = 4,
    Block = 5,
    Unblock = 6,
}

/// 登录请求，必须是连接上的第一个帧
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoginReqMsg {
    #[prost(string, tag = "1")]
    pub uid: ::prost::alloc::string::String,
    /// 设备类型，对应 DeviceType
    #[prost(int32, tag = "2")]
    pub device_type: i32,
    /// 展示名称，可为空
    #[prost(string, tag = "3")]
    pub display_name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoginRespMsg {
    #[prost(string, tag = "1")]
    pub conn_id: ::prost::alloc::string::String,
    /// 登录时补发的离线消息数
    #[prost(uint32, tag = "2")]
    pub flushed: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeartbeatMsg {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
}

/// 发送消息：`to_group` 非空为群聊，否则发给 `to_user`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SendMsgReq {
    #[prost(string, tag = "1")]
    pub to_user: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub to_group: ::prost::alloc::string::String,
    #[prost(bytes = "bytes", tag = "3")]
    pub payload: ::prost::bytes::Bytes,
    /// 客户端去重 token
    #[prost(string, tag = "4")]
    pub client_token: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SendReceiptMsg {
    #[prost(string, tag = "1")]
    pub message_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub recipient_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub sequence: u64,
    /// pending / delivered / failed
    #[prost(string, tag = "4")]
    pub status: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SendMsgResp {
    #[prost(string, tag = "1")]
    pub client_token: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub receipts: ::prost::alloc::vec::Vec<SendReceiptMsg>,
}

/// 下发给接收人的消息
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageEnvelopeMsg {
    #[prost(string, tag = "1")]
    pub sender_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub recipient_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub group_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "4")]
    pub sequence: u64,
    #[prost(bytes = "bytes", tag = "5")]
    pub payload: ::prost::bytes::Bytes,
    #[prost(int64, tag = "6")]
    pub sent_at: i64,
}

/// 确认收到 `sequence` 及之前的消息
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AckMsg {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PresenceChangedMsg {
    #[prost(string, tag = "1")]
    pub uid: ::prost::alloc::string::String,
    /// offline / online / away
    #[prost(string, tag = "2")]
    pub status: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UndeliverableMsg {
    #[prost(string, tag = "1")]
    pub message_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub recipient_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub sequence: u64,
    #[prost(string, tag = "4")]
    pub client_token: ::prost::alloc::string::String,
    #[prost(uint32, tag = "5")]
    pub attempts: u32,
    #[prost(string, tag = "6")]
    pub reason: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FriendOpReq {
    #[prost(enumeration = "FriendOp", tag = "1")]
    pub op: i32,
    /// 对端用户
    #[prost(string, tag = "2")]
    pub target: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FriendOpResp {
    #[prost(enumeration = "FriendOp", tag = "1")]
    pub op: i32,
    #[prost(string, tag = "2")]
    pub target: ::prost::alloc::string::String,
    /// 操作后的关系状态，删除时为空
    #[prost(string, tag = "3")]
    pub status: ::prost::alloc::string::String,
    #[prost(bool, tag = "4")]
    pub changed: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetAwayMsg {
    #[prost(bool, tag = "1")]
    pub away: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorRespMsg {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
    /// 出错请求的帧类型
    #[prost(enumeration = "ByteMessageType", tag = "3")]
    pub request_type: i32,
}
