use crate::biz_service::message_router::MessageRouter;
use crate::biz_service::recommend_service::RecommendService;
use crate::biz_service::session_sink::SessionSink;
use crate::entitys::friend_edge::FriendEdge;
use crate::entitys::group_entity::GroupInfo;
use crate::entitys::message_entity::{ChatTarget, HistoryPage, SendReceipt};
use crate::entitys::recommend_entity::RecommendationEntry;
use crate::entitys::user_entity::{FriendView, PresenceEvent, PresenceStatus};
use crate::manager::common::{ConnectionId, DeviceType, UserId};
use crate::manager::friend_graph::FriendGraph;
use crate::manager::group_manager::{GroupManager, GroupManagerOpt};
use crate::manager::presence_manager::PresenceManager;
use crate::manager::user_manager::UserManager;
use bytes::Bytes;
use common::config::AppConfig;
use common::util::common_utils::validate_id;
use common::{AppError, AppResult};
use log::{debug, info, warn};
use std::sync::Arc;

/// 客户端在已登录连接上发出的指令
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    SendMessage { target: ChatTarget, payload: Bytes, client_token: String },
    Ack { sequence: u64 },
    Heartbeat,
    FriendRequest { to: UserId },
    FriendRespond { requester: UserId, accept: bool },
    FriendRemove { peer: UserId },
    Block { target: UserId },
    Unblock { target: UserId },
    SetAway { away: bool },
}

/// 指令执行结果
#[derive(Debug, Clone)]
pub enum ClientReply {
    Sent(Vec<SendReceipt>),
    Acked(usize),
    HeartbeatOk,
    Friend(FriendEdge),
    Removed(bool),
    Presence(PresenceStatus),
}

/// 会话层入口：把连接事件和客户端指令分发给各个核心组件
pub struct ChatService {
    graph: Arc<FriendGraph>,
    presence: Arc<PresenceManager>,
    groups: Arc<GroupManager>,
    users: Arc<UserManager>,
    router: Arc<MessageRouter>,
    recommend: Arc<RecommendService>,
    sink: Arc<dyn SessionSink>,
    config: Arc<AppConfig>,
}

impl ChatService {
    pub fn new(config: Arc<AppConfig>, sink: Arc<dyn SessionSink>) -> Arc<Self> {
        let graph = Arc::new(FriendGraph::new());
        let presence = Arc::new(PresenceManager::new(&config.get_presence()));
        let groups = Arc::new(GroupManager::new());
        let router = Arc::new(MessageRouter::new(graph.clone(), presence.clone(), groups.clone(), sink.clone(), config.get_router()));
        let recommend = RecommendService::new(graph.clone(), config.get_recommend());
        Arc::new(Self {
            graph,
            presence,
            groups,
            users: Arc::new(UserManager::new()),
            router,
            recommend,
            sink,
            config,
        })
    }

    pub fn graph(&self) -> &Arc<FriendGraph> {
        &self.graph
    }
    pub fn presence(&self) -> &Arc<PresenceManager> {
        &self.presence
    }
    pub fn groups(&self) -> &Arc<GroupManager> {
        &self.groups
    }
    pub fn users(&self) -> &Arc<UserManager> {
        &self.users
    }
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }
    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    /// 连接登录：注册连接后立即刷新离线消息，返回补发数量
    pub async fn on_connect(&self, uid: &str, conn_id: &ConnectionId, device_type: DeviceType) -> AppResult<usize> {
        validate_id("uid", uid)?;
        validate_id("connection", &conn_id.0)?;
        self.presence.register(uid, conn_id, device_type)?;
        Ok(self.router.flush_outbox(uid).await)
    }

    pub fn on_disconnect(&self, conn_id: &ConnectionId) -> AppResult<()> {
        self.presence.unregister(conn_id).map(|_| ())
    }

    pub fn on_heartbeat(&self, conn_id: &ConnectionId) -> AppResult<()> {
        self.presence.heartbeat(conn_id)
    }

    /// 执行客户端指令，连接必须已登录
    pub async fn on_client_message(&self, conn_id: &ConnectionId, command: ClientCommand) -> AppResult<ClientReply> {
        let conn = self.presence.connection(conn_id).ok_or_else(|| AppError::NotFound(format!("connection {}", conn_id)))?;
        self.presence.heartbeat(conn_id)?;
        let uid = conn.meta.uid.as_str();
        debug!("📥 客户端指令: uid={} conn={} {:?}", uid, conn_id, command);

        let reply = match command {
            ClientCommand::SendMessage { target, payload, client_token } => match target {
                ChatTarget::User(to) => ClientReply::Sent(vec![self.router.send(uid, &to, payload, &client_token).await?]),
                ChatTarget::Group(group_id) => ClientReply::Sent(self.router.send_group(uid, &group_id, payload, &client_token).await?),
            },
            ClientCommand::Ack { sequence } => ClientReply::Acked(self.router.ack(uid, sequence).await?),
            ClientCommand::Heartbeat => ClientReply::HeartbeatOk,
            ClientCommand::FriendRequest { to } => {
                validate_id("uid", &to)?;
                ClientReply::Friend(self.graph.request_friend(uid, &to)?)
            }
            ClientCommand::FriendRespond { requester, accept } => ClientReply::Friend(self.graph.respond_friend(uid, &requester, accept)?),
            ClientCommand::FriendRemove { peer } => ClientReply::Removed(self.graph.remove_friend(uid, &peer)),
            ClientCommand::Block { target } => {
                validate_id("uid", &target)?;
                ClientReply::Friend(self.graph.block_user(uid, &target)?)
            }
            ClientCommand::Unblock { target } => ClientReply::Friend(self.graph.unblock_user(uid, &target)?),
            ClientCommand::SetAway { away } => {
                self.presence.set_away(uid, away);
                ClientReply::Presence(self.presence.status(uid))
            }
        };
        Ok(reply)
    }

    /// 把在线状态变更推送给该用户所有在线好友的连接
    pub async fn notify_presence(&self, event: &PresenceEvent) -> usize {
        let mut notified = 0;
        for friend in &self.graph.neighbors(&event.uid) {
            for conn in self.presence.connections_for(friend) {
                match self.sink.presence_changed(&conn.id, &event.uid, event.status).await {
                    Ok(()) => notified += 1,
                    Err(e) => warn!("⚠️ 在线状态推送失败: conn={} err={}", conn.id, e),
                }
            }
        }
        debug!("📡 在线状态推送: uid={} status={} 连接数={}", event.uid, event.status, notified);
        notified
    }

    /// 好友列表（含在线状态），按 ID 排序
    pub fn friend_list(&self, uid: &str) -> Vec<FriendView> {
        self.graph
            .neighbors(uid)
            .iter()
            .map(|friend| FriendView {
                uid: friend.clone(),
                display_name: self.users.display_name(friend),
                status: self.presence.status(friend),
                since: self.graph.edge(uid, friend).and_then(|e| e.accepted_at),
            })
            .collect()
    }

    pub fn pending_requests(&self, uid: &str) -> Vec<FriendEdge> {
        self.graph.pending_requests(uid)
    }

    pub fn suggestions(&self, uid: &str, limit: Option<usize>) -> Vec<RecommendationEntry> {
        self.recommend.suggest(uid, limit)
    }

    pub fn mutual_friends(&self, a: &str, b: &str) -> Vec<UserId> {
        self.recommend.mutual_friends(a, b)
    }

    pub fn history(&self, uid: &str, peer: &str, before: Option<usize>, limit: usize) -> HistoryPage {
        self.router.history(uid, peer, before, limit)
    }

    pub fn group_history(&self, uid: &str, group_id: &str, before: Option<usize>, limit: usize) -> AppResult<HistoryPage> {
        if !self.groups.is_member(group_id, uid) {
            return Err(AppError::NotGroupMember { group: group_id.to_string(), uid: uid.to_string() });
        }
        Ok(self.router.group_history(uid, group_id, before, limit))
    }

    /// 建群并拉入初始成员
    pub fn create_group(&self, owner: &str, name: &str, members: &[UserId]) -> AppResult<GroupInfo> {
        let group = self.groups.create_group(&owner.to_string(), name)?;
        for member in members {
            self.groups.add_member(&group.id, member)?;
        }
        info!("👥 群组就绪: {} 成员数={}", group.id, members.len() + 1);
        self.groups.get_group(&group.id).ok_or_else(|| AppError::NotFound(format!("group {}", group.id)))
    }
}
