use crate::biz_service::session_sink::{SendError, SessionSink};
use crate::entitys::message_entity::{MessageEnvelope, UndeliverableNotice};
use crate::entitys::user_entity::PresenceStatus;
use crate::manager::common::{ConnectionId, UserId};
use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Mutex;

/// 测试用出站实现：记录所有下发内容，可按连接模拟失败或卡住
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(ConnectionId, MessageEnvelope)>>,
    presence: Mutex<Vec<(ConnectionId, UserId, PresenceStatus)>>,
    notices: Mutex<Vec<(ConnectionId, UndeliverableNotice)>>,
    failing: DashSet<ConnectionId>,
    stalled: DashSet<ConnectionId>,
}

impl RecordingSink {
    pub fn fail(&self, conn_id: &ConnectionId) {
        self.failing.insert(conn_id.clone());
    }

    pub fn recover(&self, conn_id: &ConnectionId) {
        self.failing.remove(conn_id);
    }

    /// 投递到该连接时永不返回，直到被取消
    pub fn stall(&self, conn_id: &ConnectionId) {
        self.stalled.insert(conn_id.clone());
    }

    pub fn delivered_to(&self, conn_id: &ConnectionId) -> Vec<MessageEnvelope> {
        self.delivered.lock().unwrap().iter().filter(|(c, _)| c == conn_id).map(|(_, e)| e.clone()).collect()
    }

    pub fn presence_to(&self, conn_id: &ConnectionId) -> Vec<(UserId, PresenceStatus)> {
        self.presence.lock().unwrap().iter().filter(|(c, _, _)| c == conn_id).map(|(_, u, s)| (u.clone(), *s)).collect()
    }

    pub fn notices_to(&self, conn_id: &ConnectionId) -> Vec<UndeliverableNotice> {
        self.notices.lock().unwrap().iter().filter(|(c, _)| c == conn_id).map(|(_, n)| n.clone()).collect()
    }
}

#[async_trait]
impl SessionSink for RecordingSink {
    async fn deliver(&self, conn_id: &ConnectionId, envelope: &MessageEnvelope) -> Result<(), SendError> {
        if self.stalled.contains(conn_id) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(conn_id) {
            return Err(SendError::ChannelClosed);
        }
        self.delivered.lock().unwrap().push((conn_id.clone(), envelope.clone()));
        Ok(())
    }

    async fn presence_changed(&self, conn_id: &ConnectionId, uid: &UserId, status: PresenceStatus) -> Result<(), SendError> {
        self.presence.lock().unwrap().push((conn_id.clone(), uid.clone(), status));
        Ok(())
    }

    async fn undeliverable(&self, conn_id: &ConnectionId, notice: &UndeliverableNotice) -> Result<(), SendError> {
        self.notices.lock().unwrap().push((conn_id.clone(), notice.clone()));
        Ok(())
    }
}
