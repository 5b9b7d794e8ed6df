use crate::entitys::friend_edge::{FriendEdge, FriendStatus};
use crate::manager::common::{PairKey, UserId};
use arc_swap::ArcSwap;
use common::util::date_util::now_millis;
use common::{AppError, AppResult};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// 用户侧索引项：对端的关系状态，以及该申请是否由本人发起
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    status: FriendStatus,
    outgoing: bool,
}

/// 好友关系变更通知
#[derive(Debug, Clone)]
pub struct EdgeChange {
    pub key: PairKey,
    pub from: Option<FriendStatus>,
    pub to: FriendStatus,
    /// 一跳/两跳邻域受影响的用户：两端用户及其好友
    pub affected: HashSet<UserId>,
}

/// 好友关系变更观察者（推荐缓存失效等）
pub trait GraphObserver: Send + Sync {
    fn on_edge_changed(&self, change: &EdgeChange);
}

/// 好友 ID 快照，可重复遍历，同一快照内顺序稳定
#[derive(Debug, Clone)]
pub struct Neighbors {
    ids: Arc<[UserId]>,
}

impl Neighbors {
    fn new(mut ids: Vec<UserId>) -> Self {
        ids.sort();
        Self { ids: Arc::from(ids) }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UserId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.ids.binary_search_by(|id| id.as_str().cmp(uid)).is_ok()
    }

    pub fn to_vec(&self) -> Vec<UserId> {
        self.ids.to_vec()
    }
}

impl<'a> IntoIterator for &'a Neighbors {
    type Item = &'a UserId;
    type IntoIter = std::slice::Iter<'a, UserId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

/// 社交关系存储
///
/// - `edges`: 无序用户对 → 关系记录，所有状态变更都在该条目的分片锁内先校验再写入
/// - `links`: 用户 → 对端状态索引，只保存未删除的关系，供好友列表 / 申请列表 / 推荐使用
///
/// 加锁顺序固定为 `edges` → `links`，读取 `links` 时不会再去获取 `edges` 的锁。
pub struct FriendGraph {
    edges: DashMap<PairKey, FriendEdge>,
    links: DashMap<UserId, HashMap<UserId, Link>>,
    observers: ArcSwap<Vec<Arc<dyn GraphObserver>>>,
}

impl Default for FriendGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl FriendGraph {
    pub fn new() -> Self {
        Self {
            edges: DashMap::new(),
            links: DashMap::new(),
            observers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// 注册关系变更观察者
    pub fn subscribe(&self, observer: Arc<dyn GraphObserver>) {
        self.observers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(observer.clone());
            next
        });
    }

    /// 发起好友申请
    pub fn request_friend(&self, from: &str, to: &str) -> AppResult<FriendEdge> {
        if from == to {
            return Err(AppError::InvalidEdge(format!("cannot befriend self: {}", from)));
        }
        let now = now_millis();
        let (edge, prev) = match self.edges.entry(PairKey::new(from, to)) {
            Entry::Occupied(mut occupied) => {
                let edge = occupied.get_mut();
                if edge.is_active() {
                    return Err(AppError::InvalidEdge(format!("edge {} <-> {} already {}", from, to, edge.status)));
                }
                let prev = edge.status;
                edge.transition(FriendStatus::Pending, from, now);
                self.sync_links(edge);
                (edge.clone(), Some(prev))
            }
            Entry::Vacant(vacant) => {
                let edge = FriendEdge::new(from, to, FriendStatus::Pending, now);
                self.sync_links(&edge);
                (vacant.insert(edge).value().clone(), None)
            }
        };
        info!("🤝 好友申请: {} -> {}", from, to);
        self.notify(&edge, prev);
        Ok(edge)
    }

    /// 处理发给 `owner` 的好友申请：通过或拒绝
    pub fn respond_friend(&self, owner: &str, requester: &str, accept: bool) -> AppResult<FriendEdge> {
        let not_found = || AppError::NotFound(format!("pending friend request {} -> {}", requester, owner));
        let now = now_millis();
        let edge = {
            let mut entry = self.edges.get_mut(&PairKey::new(owner, requester)).ok_or_else(not_found)?;
            if entry.status != FriendStatus::Pending || entry.requester != requester || owner == requester {
                return Err(not_found());
            }
            let to = if accept { FriendStatus::Accepted } else { FriendStatus::Removed };
            entry.transition(to, owner, now);
            self.sync_links(entry.value());
            entry.value().clone()
        };
        info!("🤝 好友申请处理: {} -> {} => {}", requester, owner, edge.status);
        self.notify(&edge, Some(FriendStatus::Pending));
        Ok(edge)
    }

    /// 删除好友 / 撤回申请，幂等；返回是否发生了变更
    pub fn remove_friend(&self, a: &str, b: &str) -> bool {
        let now = now_millis();
        let changed = {
            let Some(mut entry) = self.edges.get_mut(&PairKey::new(a, b)) else {
                return false;
            };
            match entry.status {
                FriendStatus::Accepted | FriendStatus::Pending => {
                    let prev = entry.status;
                    entry.transition(FriendStatus::Removed, a, now);
                    self.sync_links(entry.value());
                    Some((entry.value().clone(), prev))
                }
                FriendStatus::Blocked | FriendStatus::Removed => None,
            }
        };
        match changed {
            Some((edge, prev)) => {
                info!("💔 删除好友: {} -x- {} (原状态 {})", a, b, prev);
                self.notify(&edge, Some(prev));
                true
            }
            None => {
                debug!("删除好友无变更: {} -x- {}", a, b);
                false
            }
        }
    }

    /// 拉黑用户，覆盖任何现有关系
    pub fn block_user(&self, blocker: &str, target: &str) -> AppResult<FriendEdge> {
        if blocker == target {
            return Err(AppError::InvalidEdge(format!("cannot block self: {}", blocker)));
        }
        let now = now_millis();
        let (edge, prev) = match self.edges.entry(PairKey::new(blocker, target)) {
            Entry::Occupied(mut occupied) => {
                let edge = occupied.get_mut();
                if edge.status == FriendStatus::Blocked {
                    return Err(AppError::InvalidEdge(format!("edge {} <-> {} already blocked", blocker, target)));
                }
                let prev = edge.status;
                edge.transition(FriendStatus::Blocked, blocker, now);
                self.sync_links(edge);
                (edge.clone(), Some(prev))
            }
            Entry::Vacant(vacant) => {
                let edge = FriendEdge::new(blocker, target, FriendStatus::Blocked, now);
                self.sync_links(&edge);
                (vacant.insert(edge).value().clone(), None)
            }
        };
        info!("⛔ 拉黑: {} -> {}", blocker, target);
        self.notify(&edge, prev);
        Ok(edge)
    }

    /// 取消拉黑，只有拉黑人可以操作，关系变为 removed
    pub fn unblock_user(&self, blocker: &str, target: &str) -> AppResult<FriendEdge> {
        let not_found = || AppError::NotFound(format!("block {} -> {}", blocker, target));
        let now = now_millis();
        let edge = {
            let mut entry = self.edges.get_mut(&PairKey::new(blocker, target)).ok_or_else(not_found)?;
            if entry.status != FriendStatus::Blocked || entry.blocked_by.as_deref() != Some(blocker) {
                return Err(not_found());
            }
            entry.transition(FriendStatus::Removed, blocker, now);
            self.sync_links(entry.value());
            entry.value().clone()
        };
        info!("✅ 取消拉黑: {} -> {}", blocker, target);
        self.notify(&edge, Some(FriendStatus::Blocked));
        Ok(edge)
    }

    /// 已通过的好友快照
    pub fn neighbors(&self, uid: &str) -> Neighbors {
        let ids = self
            .links
            .get(uid)
            .map(|links| links.iter().filter(|(_, link)| link.status == FriendStatus::Accepted).map(|(id, _)| id.clone()).collect())
            .unwrap_or_default();
        Neighbors::new(ids)
    }

    pub fn are_friends(&self, a: &str, b: &str) -> bool {
        self.status_between(a, b) == Some(FriendStatus::Accepted)
    }

    /// 两人之间未删除关系的状态
    pub fn status_between(&self, a: &str, b: &str) -> Option<FriendStatus> {
        self.links.get(a).and_then(|links| links.get(b).map(|link| link.status))
    }

    pub fn edge(&self, a: &str, b: &str) -> Option<FriendEdge> {
        self.edges.get(&PairKey::new(a, b)).map(|e| e.value().clone())
    }

    /// 发给 `uid` 的待处理申请，按申请时间正序
    pub fn pending_requests(&self, uid: &str) -> Vec<FriendEdge> {
        let requesters: Vec<UserId> = self
            .links
            .get(uid)
            .map(|links| links.iter().filter(|(_, link)| link.status == FriendStatus::Pending && !link.outgoing).map(|(id, _)| id.clone()).collect())
            .unwrap_or_default();
        let mut list: Vec<FriendEdge> = requesters
            .iter()
            .filter_map(|requester| self.edge(uid, requester))
            .filter(|edge| edge.status == FriendStatus::Pending && edge.addressee() == uid)
            .collect();
        list.sort_by(|x, y| x.updated_at.cmp(&y.updated_at).then_with(|| x.requester.cmp(&y.requester)));
        list
    }

    /// 与 `uid` 存在未删除关系（pending / accepted / blocked）的所有用户
    pub fn related(&self, uid: &str) -> HashSet<UserId> {
        self.links.get(uid).map(|links| links.keys().cloned().collect()).unwrap_or_default()
    }

    /// 同步两端用户索引，调用方持有该关系条目的锁
    fn sync_links(&self, edge: &FriendEdge) {
        for (uid, other) in [(&edge.key.a, &edge.key.b), (&edge.key.b, &edge.key.a)] {
            if edge.is_active() {
                let link = Link { status: edge.status, outgoing: edge.requester == *uid };
                self.links.entry(uid.clone()).or_default().insert(other.clone(), link);
            } else {
                if let Some(mut links) = self.links.get_mut(uid) {
                    links.remove(other);
                }
                self.links.remove_if(uid, |_, links| links.is_empty());
            }
        }
    }

    fn notify(&self, edge: &FriendEdge, from: Option<FriendStatus>) {
        let observers = self.observers.load();
        if observers.is_empty() {
            return;
        }
        let mut affected = HashSet::new();
        for uid in [&edge.key.a, &edge.key.b] {
            affected.insert(uid.clone());
            affected.extend(self.neighbors(uid).iter().cloned());
        }
        let change = EdgeChange { key: edge.key.clone(), from, to: edge.status, affected };
        for observer in observers.iter() {
            observer.on_edge_changed(&change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn befriend(graph: &FriendGraph, a: &str, b: &str) {
        graph.request_friend(a, b).unwrap();
        graph.respond_friend(b, a, true).unwrap();
    }

    #[test]
    fn test_accept_makes_both_sides_neighbors() {
        let graph = FriendGraph::new();
        graph.request_friend("alice", "bob").unwrap();
        assert!(graph.neighbors("alice").is_empty());
        let edge = graph.respond_friend("bob", "alice", true).unwrap();
        assert_eq!(edge.status, FriendStatus::Accepted);
        assert!(edge.accepted_at.is_some());

        assert!(graph.neighbors("alice").contains("bob"));
        assert!(graph.neighbors("bob").contains("alice"));
        assert!(graph.are_friends("bob", "alice"));

        let err = graph.request_friend("alice", "bob").unwrap_err();
        assert!(matches!(err, AppError::InvalidEdge(_)));
        let err = graph.request_friend("bob", "alice").unwrap_err();
        assert!(matches!(err, AppError::InvalidEdge(_)));
    }

    #[test]
    fn test_request_self_is_invalid() {
        let graph = FriendGraph::new();
        assert!(matches!(graph.request_friend("alice", "alice"), Err(AppError::InvalidEdge(_))));
    }

    #[test]
    fn test_respond_requires_pending_request_addressed_to_owner() {
        let graph = FriendGraph::new();
        assert!(matches!(graph.respond_friend("bob", "alice", true), Err(AppError::NotFound(_))));
        graph.request_friend("alice", "bob").unwrap();
        // 申请人不能替对方通过
        assert!(matches!(graph.respond_friend("alice", "bob", true), Err(AppError::NotFound(_))));
        let edge = graph.respond_friend("bob", "alice", false).unwrap();
        assert_eq!(edge.status, FriendStatus::Removed);
        assert!(graph.pending_requests("bob").is_empty());
        assert!(matches!(graph.respond_friend("bob", "alice", true), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_concurrent_requests_only_one_wins() {
        let graph = FriendGraph::new();
        let ok = AtomicUsize::new(0);
        let invalid = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for i in 0..8 {
                let (graph, ok, invalid) = (&graph, &ok, &invalid);
                s.spawn(move || {
                    let (from, to) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
                    match graph.request_friend(from, to) {
                        Ok(_) => ok.fetch_add(1, Ordering::SeqCst),
                        Err(AppError::InvalidEdge(_)) => invalid.fetch_add(1, Ordering::SeqCst),
                        Err(e) => panic!("unexpected error: {:?}", e),
                    };
                });
            }
        });
        assert_eq!(ok.load(Ordering::SeqCst), 1);
        assert_eq!(invalid.load(Ordering::SeqCst), 7);
        assert_eq!(graph.edge("alice", "bob").unwrap().history.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent_and_rerequest_reopens_same_record() {
        let graph = FriendGraph::new();
        assert!(!graph.remove_friend("alice", "bob"));
        befriend(&graph, "alice", "bob");
        assert!(graph.remove_friend("bob", "alice"));
        assert!(!graph.remove_friend("bob", "alice"));
        assert!(!graph.are_friends("alice", "bob"));
        assert_eq!(graph.edge("alice", "bob").unwrap().status, FriendStatus::Removed);
        assert!(graph.related("alice").is_empty());

        let edge = graph.request_friend("bob", "alice").unwrap();
        assert_eq!(edge.status, FriendStatus::Pending);
        assert_eq!(edge.requester, "bob");
        assert_eq!(edge.history.len(), 4);
        assert_eq!(graph.pending_requests("alice").len(), 1);
        assert!(graph.pending_requests("bob").is_empty());
    }

    #[test]
    fn test_block_and_unblock() {
        let graph = FriendGraph::new();
        befriend(&graph, "alice", "bob");
        let edge = graph.block_user("bob", "alice").unwrap();
        assert_eq!(edge.blocked_by.as_deref(), Some("bob"));
        assert!(!graph.are_friends("alice", "bob"));
        assert!(graph.related("alice").contains("bob"));
        assert!(matches!(graph.request_friend("alice", "bob"), Err(AppError::InvalidEdge(_))));
        assert!(matches!(graph.block_user("alice", "bob"), Err(AppError::InvalidEdge(_))));
        // 删除好友不会解除拉黑
        assert!(!graph.remove_friend("alice", "bob"));
        assert!(matches!(graph.unblock_user("alice", "bob"), Err(AppError::NotFound(_))));

        let edge = graph.unblock_user("bob", "alice").unwrap();
        assert_eq!(edge.status, FriendStatus::Removed);
        assert!(graph.request_friend("alice", "bob").is_ok());

        // 陌生人也可以直接拉黑
        let edge = graph.block_user("carol", "dave").unwrap();
        assert_eq!(edge.status, FriendStatus::Blocked);
    }

    #[test]
    fn test_neighbors_snapshot_is_restartable() {
        let graph = FriendGraph::new();
        befriend(&graph, "alice", "carol");
        befriend(&graph, "alice", "bob");
        let snapshot = graph.neighbors("alice");
        let first: Vec<_> = snapshot.iter().cloned().collect();
        befriend(&graph, "alice", "dave");
        let second: Vec<_> = (&snapshot).into_iter().cloned().collect();
        assert_eq!(first, vec!["bob".to_string(), "carol".to_string()]);
        assert_eq!(first, second);
        assert_eq!(graph.neighbors("alice").len(), 3);
    }

    #[derive(Default)]
    struct Recorder {
        changes: Mutex<Vec<EdgeChange>>,
    }
    impl GraphObserver for Recorder {
        fn on_edge_changed(&self, change: &EdgeChange) {
            self.changes.lock().unwrap().push(change.clone());
        }
    }

    #[test]
    fn test_observer_receives_two_hop_neighbourhood() {
        let graph = FriendGraph::new();
        befriend(&graph, "alice", "bob");
        befriend(&graph, "carol", "dave");
        let recorder = Arc::new(Recorder::default());
        graph.subscribe(recorder.clone());

        befriend(&graph, "bob", "carol");
        let changes = recorder.changes.lock().unwrap();
        assert_eq!(changes.len(), 2);
        let accepted = &changes[1];
        assert_eq!(accepted.from, Some(FriendStatus::Pending));
        assert_eq!(accepted.to, FriendStatus::Accepted);
        for uid in ["alice", "bob", "carol", "dave"] {
            assert!(accepted.affected.contains(uid), "missing {}", uid);
        }
    }
}
