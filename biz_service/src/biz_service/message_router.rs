use crate::biz_service::session_sink::SessionSink;
use crate::entitys::message_entity::{
    ConversationKey, DeliveryStatus, HistoryPage, MessageEntity, MessageEnvelope, SendReceipt, UndeliverableNotice,
};
use crate::manager::common::{PairKey, UserId};
use crate::manager::friend_graph::FriendGraph;
use crate::manager::group_manager::{GroupManager, GroupManagerOpt};
use crate::manager::presence_manager::{ConnectionInfo, PresenceManager};
use bytes::Bytes;
use common::config::RouterConfig;
use common::util::common_utils::build_uuid;
use common::util::date_util::now_millis;
use common::{AppError, AppResult};
use dashmap::DashMap;
use futures::future::join_all;
use log::{debug, info, warn};
use moka::sync::Cache;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// 单个接收人的投递状态
#[derive(Debug, Default)]
struct Mailbox {
    /// 已分配的最大序号
    next_seq: u64,
    /// 客户端确认的最大序号，只由 `ack` 推进
    last_acked: u64,
    /// 未确认队列：序号 -> 消息
    outbox: BTreeMap<u64, OutboxSlot>,
}

/// 写入连接不等于客户端收到，确认之前条目一直保留，重新上线时补发
#[derive(Debug)]
struct OutboxSlot {
    message_id: String,
    /// 已交给当前在线连接
    handed_off: bool,
}

/// (发送人, 接收人, 客户端 token)
type DedupeKey = (UserId, UserId, String);

/// 消息路由
///
/// 每个接收人一把 `Mailbox` 锁：序号分配、outbox 刷新与投递都在该锁内进行，
/// 不同接收人之间互不阻塞。上线时的 outbox 刷新与 `send` 竞争同一把锁，
/// 因此不会出现连接已注册、消息却被遗留在 outbox 中的情况。
pub struct MessageRouter {
    graph: Arc<FriendGraph>,
    presence: Arc<PresenceManager>,
    groups: Arc<GroupManager>,
    sink: Arc<dyn SessionSink>,
    mailboxes: DashMap<UserId, Arc<Mutex<Mailbox>>>,
    messages: DashMap<String, MessageEntity>,
    conversations: DashMap<ConversationKey, Vec<String>>,
    /// 客户端 token 去重：DedupeKey -> 消息ID
    dedupe: Cache<DedupeKey, String>,
    config: RouterConfig,
}

impl MessageRouter {
    pub fn new(
        graph: Arc<FriendGraph>,
        presence: Arc<PresenceManager>,
        groups: Arc<GroupManager>,
        sink: Arc<dyn SessionSink>,
        config: RouterConfig,
    ) -> Self {
        let dedupe = Cache::builder().max_capacity(config.dedupe_capacity).time_to_live(config.dedupe_ttl()).build();
        Self {
            graph,
            presence,
            groups,
            sink,
            mailboxes: DashMap::new(),
            messages: DashMap::new(),
            conversations: DashMap::new(),
            dedupe,
            config,
        }
    }

    /// 单聊发送：只能发给已通过的好友
    pub async fn send(&self, sender: &str, recipient: &str, payload: Bytes, client_token: &str) -> AppResult<SendReceipt> {
        if !self.graph.are_friends(sender, recipient) {
            return Err(AppError::NotFriends { sender: sender.to_string(), recipient: recipient.to_string() });
        }
        self.route(sender, recipient, None, payload, client_token).await
    }

    /// 群聊发送：按成员拆分为单个接收人的消息，各自独立排序与投递
    pub async fn send_group(&self, sender: &str, group_id: &str, payload: Bytes, client_token: &str) -> AppResult<Vec<SendReceipt>> {
        let members = self.groups.members(group_id)?;
        if !members.iter().any(|m| m == sender) {
            return Err(AppError::NotGroupMember { group: group_id.to_string(), uid: sender.to_string() });
        }
        let routes = members
            .iter()
            .filter(|m| m.as_str() != sender)
            .map(|member| self.route(sender, member, Some(group_id), payload.clone(), client_token));
        let mut receipts = Vec::with_capacity(members.len());
        for (member, result) in members.iter().filter(|m| m.as_str() != sender).zip(join_all(routes).await) {
            match result {
                Ok(receipt) => receipts.push(receipt),
                // 单个成员投递失败不影响其他成员
                Err(AppError::DeliveryExhausted { message_id, sequence, .. }) => receipts.push(SendReceipt {
                    message_id,
                    recipient_id: member.clone(),
                    sequence,
                    status: DeliveryStatus::Failed,
                }),
                Err(e) => return Err(e),
            }
        }
        Ok(receipts)
    }

    async fn route(&self, sender: &str, recipient: &str, group_id: Option<&str>, payload: Bytes, client_token: &str) -> AppResult<SendReceipt> {
        let client_token = if client_token.is_empty() { build_uuid() } else { client_token.to_string() };
        let dedupe_key = (sender.to_string(), recipient.to_string(), client_token.clone());

        let mailbox = self.mailbox(recipient);
        let mut mb = mailbox.lock().await;

        if let Some(existing) = self.dedupe.get(&dedupe_key).and_then(|id| self.message(&id)) {
            debug!("🔄 重复发送，返回已有结果: sender={} token={}", sender, client_token);
            return Self::receipt_result(&existing);
        }

        mb.next_seq += 1;
        let message = MessageEntity {
            message_id: build_uuid(),
            sender_id: sender.to_string(),
            recipient_id: recipient.to_string(),
            group_id: group_id.map(str::to_string),
            payload,
            client_token,
            sequence: mb.next_seq,
            status: DeliveryStatus::Pending,
            attempts: 0,
            sent_at: now_millis(),
        };
        let message_id = message.message_id.clone();
        self.conversations.entry(message.conversation_key()).or_default().push(message_id.clone());
        mb.outbox.insert(message.sequence, OutboxSlot { message_id: message_id.clone(), handed_off: false });
        debug!("📨 消息入队: {} -> {} seq={}", sender, recipient, message.sequence);
        self.messages.insert(message_id.clone(), message);
        self.dedupe.insert(dedupe_key, message_id.clone());

        // 先投递更早的积压消息，保证接收端按序号递增收到
        self.drain(recipient, &mut mb).await;
        drop(mb);

        let message = self.message(&message_id).ok_or_else(|| AppError::Internal(format!("message {} vanished", message_id)))?;
        Self::receipt_result(&message)
    }

    /// 接收人上线后重发所有未确认消息，返回交给连接的数量
    ///
    /// 同一用户的其他在线设备也会再次收到，客户端按序号去重。
    pub async fn flush_outbox(&self, uid: &str) -> usize {
        let mailbox = self.mailbox(uid);
        let mut mb = mailbox.lock().await;
        if mb.outbox.is_empty() {
            return 0;
        }
        for slot in mb.outbox.values_mut() {
            slot.handed_off = false;
        }
        let delivered = self.drain(uid, &mut mb).await;
        info!("📬 outbox 刷新: uid={} 投递={} 剩余={}", uid, delivered, mb.outbox.len());
        delivered
    }

    /// 客户端确认收到 `sequence` 及之前的消息，返回新确认的 outbox 条目数
    pub async fn ack(&self, uid: &str, sequence: u64) -> AppResult<usize> {
        let mailbox = self.mailbox(uid);
        let mut mb = mailbox.lock().await;
        if sequence > mb.next_seq {
            return Err(AppError::Validation(format!("sequence {} not assigned for {}", sequence, uid)));
        }
        if sequence <= mb.last_acked {
            return Ok(0);
        }
        mb.last_acked = sequence;
        let remaining = mb.outbox.split_off(&(sequence + 1));
        let acked = std::mem::replace(&mut mb.outbox, remaining);
        for slot in acked.values() {
            self.set_status(&slot.message_id, DeliveryStatus::Delivered);
        }
        debug!("✅ 客户端确认: uid={} seq={}", uid, sequence);
        Ok(acked.len())
    }

    /// 单聊历史分页
    pub fn history(&self, uid: &str, peer: &str, before: Option<usize>, limit: usize) -> HistoryPage {
        self.page(&ConversationKey::Direct(PairKey::new(uid, peer)), before, limit)
    }

    /// 群聊历史分页（成员自己的消息视图）
    pub fn group_history(&self, uid: &str, group_id: &str, before: Option<usize>, limit: usize) -> HistoryPage {
        self.page(&ConversationKey::Group(group_id.to_string(), uid.to_string()), before, limit)
    }

    pub fn message(&self, message_id: &str) -> Option<MessageEntity> {
        self.messages.get(message_id).map(|m| m.clone())
    }

    /// 未确认的 outbox 条目数，包括已写入连接但客户端尚未确认的
    pub async fn pending_count(&self, uid: &str) -> usize {
        self.mailbox(uid).lock().await.outbox.len()
    }

    pub async fn last_acked(&self, uid: &str) -> u64 {
        self.mailbox(uid).lock().await.last_acked
    }

    fn mailbox(&self, uid: &str) -> Arc<Mutex<Mailbox>> {
        self.mailboxes.entry(uid.to_string()).or_default().clone()
    }

    /// 按序号从小到大投递尚未交给连接的条目，遇到接收人离线即停止；调用方持有该接收人的锁
    async fn drain(&self, recipient: &str, mb: &mut Mailbox) -> usize {
        let waiting: Vec<(u64, String)> = mb
            .outbox
            .iter()
            .filter(|(_, slot)| !slot.handed_off)
            .map(|(&sequence, slot)| (sequence, slot.message_id.clone()))
            .collect();
        let mut delivered = 0;
        for (sequence, message_id) in waiting {
            match self.dispatch(recipient, &message_id).await {
                DeliveryStatus::Delivered => {
                    if let Some(slot) = mb.outbox.get_mut(&sequence) {
                        slot.handed_off = true;
                    }
                    delivered += 1;
                }
                DeliveryStatus::Failed => {
                    mb.outbox.remove(&sequence);
                }
                DeliveryStatus::Pending => break,
            }
        }
        delivered
    }

    /// 投递单条消息：在线则扇出到所有连接，失败按退避重试，超出预算标记为 failed
    async fn dispatch(&self, recipient: &str, message_id: &str) -> DeliveryStatus {
        let Some(envelope) = self.messages.get(message_id).map(|m| m.envelope()) else {
            warn!("⚠️ outbox 中的消息不存在: {}", message_id);
            return DeliveryStatus::Failed;
        };
        let budget = self.config.retry_budget.max(1);
        loop {
            let conns = self.presence.connections_for(recipient);
            if conns.is_empty() {
                debug!("📭 接收人离线，消息保留在 outbox: {} seq={}", recipient, envelope.sequence);
                return DeliveryStatus::Pending;
            }
            let attempts = self.bump_attempts(message_id);
            let acked = self.fan_out(&conns, &envelope).await;
            if acked > 0 {
                self.set_status(message_id, DeliveryStatus::Delivered);
                debug!("📤 投递成功: {} seq={} 连接数={}/{}", recipient, envelope.sequence, acked, conns.len());
                return DeliveryStatus::Delivered;
            }
            if attempts >= budget {
                self.set_status(message_id, DeliveryStatus::Failed);
                warn!("❌ 投递失败，超出重试预算: {} seq={} attempts={}", recipient, envelope.sequence, attempts);
                self.notify_undeliverable(message_id).await;
                return DeliveryStatus::Failed;
            }
            let backoff = self.config.backoff(attempts);
            debug!("🔁 投递重试: {} seq={} attempt={} backoff={:?}", recipient, envelope.sequence, attempts, backoff);
            tokio::time::sleep(backoff).await;
        }
    }

    /// 并发投递到接收人的每个连接，返回确认接收的连接数；连接断开只取消该连接的投递
    async fn fan_out(&self, conns: &[ConnectionInfo], envelope: &MessageEnvelope) -> usize {
        let timeout = self.config.delivery_timeout();
        let attempts = conns.iter().map(|conn| {
            let cancel = conn.cancel_token();
            async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("🔌 连接已断开，取消投递: {}", conn.id);
                        false
                    }
                    result = tokio::time::timeout(timeout, self.sink.deliver(&conn.id, envelope)) => match result {
                        Ok(Ok(())) => true,
                        Ok(Err(e)) => {
                            warn!("⚠️ 投递到连接失败: conn={} err={}", conn.id, e);
                            false
                        }
                        Err(_) => {
                            warn!("⏱️ 投递超时: conn={}", conn.id);
                            false
                        }
                    },
                }
            }
        });
        join_all(attempts).await.into_iter().filter(|ok| *ok).count()
    }

    async fn notify_undeliverable(&self, message_id: &str) {
        let Some(message) = self.message(message_id) else {
            return;
        };
        let notice = UndeliverableNotice {
            message_id: message.message_id.clone(),
            recipient_id: message.recipient_id.clone(),
            sequence: message.sequence,
            client_token: message.client_token.clone(),
            attempts: message.attempts,
            reason: format!("retry budget of {} attempts exhausted", self.config.retry_budget.max(1)),
        };
        for conn in self.presence.connections_for(&message.sender_id) {
            if let Err(e) = self.sink.undeliverable(&conn.id, &notice).await {
                warn!("⚠️ 失败通知发送失败: conn={} err={}", conn.id, e);
            }
        }
    }

    fn page(&self, key: &ConversationKey, before: Option<usize>, limit: usize) -> HistoryPage {
        let limit = limit.clamp(1, self.config.history_page_max.max(1));
        let (ids, start) = match self.conversations.get(key) {
            Some(list) => {
                let end = before.unwrap_or(list.len()).min(list.len());
                let start = end.saturating_sub(limit);
                (list[start..end].to_vec(), start)
            }
            None => (Vec::new(), 0),
        };
        HistoryPage {
            items: ids.iter().filter_map(|id| self.message(id)).collect(),
            next_before: (start > 0).then_some(start),
        }
    }

    fn set_status(&self, message_id: &str, status: DeliveryStatus) {
        if let Some(mut message) = self.messages.get_mut(message_id) {
            message.status = status;
        }
    }

    fn bump_attempts(&self, message_id: &str) -> u32 {
        self.messages
            .get_mut(message_id)
            .map(|mut message| {
                message.attempts += 1;
                message.attempts
            })
            .unwrap_or(u32::MAX)
    }

    fn receipt_result(message: &MessageEntity) -> AppResult<SendReceipt> {
        match message.status {
            DeliveryStatus::Failed => Err(AppError::DeliveryExhausted {
                message_id: message.message_id.clone(),
                sequence: message.sequence,
                attempts: message.attempts,
            }),
            _ => Ok(message.receipt()),
        }
    }
}
