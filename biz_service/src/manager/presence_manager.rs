use crate::entitys::user_entity::{PresenceEvent, PresenceStatus};
use crate::manager::common::{ConnectionId, DeviceType, UserId};
use common::config::PresenceConfig;
use common::util::date_util::{now, now_millis};
use common::{AppError, AppResult};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 连接元信息（用户、设备）
#[derive(Clone, Debug)]
pub struct ConnectionMeta {
    pub uid: UserId,
    pub device_type: DeviceType,
}

/// 连接实体（包含心跳状态与取消令牌）
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub meta: ConnectionMeta,
    /// 建立时间（秒）
    pub opened_at: i64,
    /// 最后活跃时间，相对 PresenceManager 启动时刻的毫秒数
    last_activity: Arc<AtomicU64>,
    /// 连接断开时取消该连接上正在进行的投递
    cancel: CancellationToken,
}

impl ConnectionInfo {
    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// 在线状态管理器：连接生命周期与用户 online / offline 状态的唯一来源
///
/// 用户的首个连接注册、最后一个连接注销都在 `user_index` 的用户条目锁内判定，
/// 因此每次上线 / 下线只会广播一次且按发生顺序广播。
pub struct PresenceManager {
    /// 所有连接，键为连接唯一ID
    connections: DashMap<ConnectionId, ConnectionInfo>,
    /// 用户ID到连接ID集合的映射（多终端）
    user_index: DashMap<UserId, HashSet<ConnectionId>>,
    /// 外部设置的离开状态，与连接数无关
    away: DashSet<UserId>,
    events: broadcast::Sender<PresenceEvent>,
    epoch: Instant,
    heartbeat_timeout: Duration,
}

impl PresenceManager {
    pub fn new(config: &PresenceConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            connections: DashMap::new(),
            user_index: DashMap::new(),
            away: DashSet::new(),
            events,
            epoch: Instant::now(),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }

    /// 订阅在线状态变更
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.events.subscribe()
    }

    /// 注册连接；返回 true 表示用户由离线变为在线
    ///
    /// 锁顺序为 `user_index` -> `connections`，与 `connections_for` 一致。
    pub fn register(&self, uid: &str, conn_id: &ConnectionId, device_type: DeviceType) -> AppResult<bool> {
        let mut conns = self.user_index.entry(uid.to_string()).or_default();
        match self.connections.entry(conn_id.clone()) {
            Entry::Occupied(existing) => {
                let owned = existing.get().meta.uid == uid;
                if owned {
                    existing.get().last_activity.store(self.now_ms(), Ordering::Relaxed);
                }
                drop(existing);
                let empty = conns.is_empty();
                drop(conns);
                if empty {
                    self.user_index.remove_if(uid, |_, set| set.is_empty());
                }
                if !owned {
                    return Err(AppError::Validation(format!("connection {} already owned by another user", conn_id)));
                }
                debug!("🔁 重复注册连接，仅刷新活跃时间: {}", conn_id);
                return Ok(false);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ConnectionInfo {
                    id: conn_id.clone(),
                    meta: ConnectionMeta { uid: uid.to_string(), device_type },
                    opened_at: now(),
                    last_activity: Arc::new(AtomicU64::new(self.now_ms())),
                    cancel: CancellationToken::new(),
                });
            }
        }

        let first = conns.is_empty();
        conns.insert(conn_id.clone());
        if first {
            self.publish(uid, self.current_status(uid, true));
        }
        drop(conns);

        info!("🔌 连接注册: uid={} conn={} device={:?} 首个连接={}", uid, conn_id, device_type, first);
        Ok(first)
    }

    /// 心跳续期
    pub fn heartbeat(&self, conn_id: &ConnectionId) -> AppResult<()> {
        let conn = self.connections.get(conn_id).ok_or_else(|| AppError::NotFound(format!("connection {}", conn_id)))?;
        conn.last_activity.store(self.now_ms(), Ordering::Relaxed);
        Ok(())
    }

    /// 注销连接：显式断开与心跳超时共用此路径
    pub fn unregister(&self, conn_id: &ConnectionId) -> AppResult<ConnectionInfo> {
        let (_, conn) = self.connections.remove(conn_id).ok_or_else(|| AppError::NotFound(format!("connection {}", conn_id)))?;
        conn.cancel.cancel();

        let uid = &conn.meta.uid;
        if let Entry::Occupied(mut occupied) = self.user_index.entry(uid.clone()) {
            occupied.get_mut().remove(conn_id);
            if occupied.get().is_empty() {
                occupied.remove();
                self.publish(uid, PresenceStatus::Offline);
                info!("🔴 用户下线: {}", uid);
            }
        }
        info!("🔌 连接断开: uid={} conn={}", uid, conn_id);
        Ok(conn)
    }

    pub fn is_online(&self, uid: &str) -> bool {
        self.user_index.get(uid).is_some_and(|set| !set.is_empty())
    }

    /// 获取用户所有连接
    pub fn connections_for(&self, uid: &str) -> Vec<ConnectionInfo> {
        self.user_index
            .get(uid)
            .map(|set| set.iter().filter_map(|id| self.connections.get(id).map(|c| c.clone())).collect())
            .unwrap_or_default()
    }

    pub fn connection(&self, conn_id: &ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(conn_id).map(|c| c.clone())
    }

    pub fn status(&self, uid: &str) -> PresenceStatus {
        self.current_status(uid, self.is_online(uid))
    }

    /// 设置 / 取消离开状态；在线时状态变化会广播
    pub fn set_away(&self, uid: &str, away: bool) {
        let changed = if away { self.away.insert(uid.to_string()) } else { self.away.remove(uid).is_some() };
        if !changed {
            return;
        }
        if let Some(conns) = self.user_index.get(uid) {
            if !conns.is_empty() {
                self.publish(uid, self.current_status(uid, true));
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn online_user_count(&self) -> usize {
        self.user_index.len()
    }

    /// 心跳超时的连接
    pub fn expired(&self) -> Vec<ConnectionId> {
        let now_ms = self.now_ms();
        let timeout_ms = self.heartbeat_timeout.as_millis() as u64;
        self.connections
            .iter()
            .filter(|item| now_ms.saturating_sub(item.value().last_activity_ms()) > timeout_ms)
            .map(|item| item.key().clone())
            .collect()
    }

    /// 清理心跳超时连接，返回清理数量
    pub fn sweep_expired(&self) -> usize {
        let mut removed = 0;
        for conn_id in self.expired() {
            warn!("⏱️ 心跳超时: {}", conn_id);
            // 并发断开时可能已被移除
            if self.unregister(&conn_id).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    fn current_status(&self, uid: &str, online: bool) -> PresenceStatus {
        if !online {
            PresenceStatus::Offline
        } else if self.away.contains(uid) {
            PresenceStatus::Away
        } else {
            PresenceStatus::Online
        }
    }

    fn publish(&self, uid: &str, status: PresenceStatus) {
        // 没有订阅者时 send 返回错误，忽略即可
        let _ = self.events.send(PresenceEvent { uid: uid.to_string(), status, at: now_millis() });
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
