use async_trait::async_trait;
use biz_service::biz_service::session_sink::{SendError, SessionSink};
use biz_service::entitys::message_entity::{MessageEnvelope, UndeliverableNotice};
use biz_service::entitys::user_entity::PresenceStatus;
use biz_service::manager::common::{ConnectionId, UserId};
use biz_service::protocol::encode_frame;
use biz_service::protocol::msg::{ByteMessageType, MessageEnvelopeMsg, PresenceChangedMsg, UndeliverableMsg};
use bytes::Bytes;
use dashmap::DashMap;
use log::debug;
use prost::Message;
use tokio::sync::mpsc;

/// 连接 ID -> 写通道；帧进入写通道即视为连接已接收
#[derive(Default)]
pub struct SocketSink {
    senders: DashMap<ConnectionId, mpsc::UnboundedSender<Bytes>>,
}

impl SocketSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, conn_id: &ConnectionId, sender: mpsc::UnboundedSender<Bytes>) {
        self.senders.insert(conn_id.clone(), sender);
    }

    pub fn detach(&self, conn_id: &ConnectionId) {
        self.senders.remove(conn_id);
    }

    /// 发送到指定连接
    pub fn send_to_connection(&self, conn_id: &ConnectionId, bytes: Bytes) -> Result<(), SendError> {
        let sender = self.senders.get(conn_id).ok_or(SendError::ConnectionNotFound)?;
        sender.send(bytes).map_err(|_| SendError::ChannelClosed)
    }

    /// 发送消息到指定连接（使用 ByteMessageType 前缀）
    pub fn send_proto<M: Message>(&self, conn_id: &ConnectionId, msg_type: ByteMessageType, msg: &M) -> Result<(), SendError> {
        self.send_to_connection(conn_id, encode_frame(msg_type, msg)?)
    }
}

#[async_trait]
impl SessionSink for SocketSink {
    async fn deliver(&self, conn_id: &ConnectionId, envelope: &MessageEnvelope) -> Result<(), SendError> {
        self.send_proto(conn_id, ByteMessageType::MessageEnvelopeMsgType, &MessageEnvelopeMsg::from(envelope))
    }

    async fn presence_changed(&self, conn_id: &ConnectionId, uid: &UserId, status: PresenceStatus) -> Result<(), SendError> {
        debug!("📡 推送在线状态: conn={} uid={} {}", conn_id, uid, status);
        let msg = PresenceChangedMsg { uid: uid.clone(), status: status.to_string() };
        self.send_proto(conn_id, ByteMessageType::PresenceChangedMsgType, &msg)
    }

    async fn undeliverable(&self, conn_id: &ConnectionId, notice: &UndeliverableNotice) -> Result<(), SendError> {
        self.send_proto(conn_id, ByteMessageType::UndeliverableMsgType, &UndeliverableMsg::from(notice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biz_service::protocol::decode_frame;

    #[tokio::test]
    async fn test_deliver_writes_typed_frame() {
        let sink = SocketSink::new();
        let conn = ConnectionId::from("c1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        sink.attach(&conn, tx);

        let envelope = MessageEnvelope {
            sender_id: "alice".to_string(),
            recipient_id: "bob".to_string(),
            group_id: None,
            sequence: 3,
            payload: Bytes::from_static(b"hi"),
            sent_at: 1,
        };
        sink.deliver(&conn, &envelope).await.unwrap();

        let (msg_type, body) = decode_frame(rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg_type, ByteMessageType::MessageEnvelopeMsgType);
        let msg = MessageEnvelopeMsg::decode(body).unwrap();
        assert_eq!(msg.sequence, 3);
        assert_eq!(msg.group_id, "");
    }

    #[tokio::test]
    async fn test_detached_or_closed_connection_fails() {
        let sink = SocketSink::new();
        let conn = ConnectionId::from("c1");
        let err = sink.presence_changed(&conn, &"alice".to_string(), PresenceStatus::Online).await.unwrap_err();
        assert!(matches!(err, SendError::ConnectionNotFound));

        let (tx, rx) = mpsc::unbounded_channel();
        sink.attach(&conn, tx);
        drop(rx);
        let err = sink.presence_changed(&conn, &"alice".to_string(), PresenceStatus::Online).await.unwrap_err();
        assert!(matches!(err, SendError::ChannelClosed));
    }
}
