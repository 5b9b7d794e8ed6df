use crate::entitys::recommend_entity::RecommendationEntry;
use crate::manager::common::UserId;
use crate::manager::friend_graph::{EdgeChange, FriendGraph, GraphObserver};
use common::config::RecommendConfig;
use dashmap::DashMap;
use log::debug;
use moka::sync::Cache;
use std::collections::HashMap;
use std::sync::Arc;

/// 好友推荐：按共同好友数给二度好友打分
///
/// 结果按用户缓存，关系变更时由 `FriendGraph` 通知失效。每个用户维护一个版本号，
/// 计算前后版本不一致说明期间有变更，结果不写入缓存。
pub struct RecommendService {
    graph: Arc<FriendGraph>,
    cache: Cache<UserId, Arc<Vec<RecommendationEntry>>>,
    epochs: DashMap<UserId, u64>,
    config: RecommendConfig,
}

impl RecommendService {
    /// 创建并注册为关系变更观察者
    pub fn new(graph: Arc<FriendGraph>, config: RecommendConfig) -> Arc<Self> {
        let service = Arc::new(Self {
            graph: graph.clone(),
            cache: Cache::new(config.cache_capacity),
            epochs: DashMap::new(),
            config,
        });
        graph.subscribe(service.clone());
        service
    }

    /// 推荐列表，按分数降序、候选人 ID 升序；`limit` 为空使用默认值
    pub fn suggest(&self, uid: &str, limit: Option<usize>) -> Vec<RecommendationEntry> {
        let limit = limit.unwrap_or(self.config.default_limit).min(self.config.max_limit);
        if limit == 0 {
            return Vec::new();
        }
        if let Some(cached) = self.cache.get(uid) {
            return cached.iter().take(limit).cloned().collect();
        }

        let epoch = self.epoch(uid);
        let computed = Arc::new(self.compute(uid));
        if self.epoch(uid) == epoch {
            self.cache.insert(uid.to_string(), computed.clone());
            // 插入与失效交错时以失效为准
            if self.epoch(uid) != epoch {
                self.cache.invalidate(uid);
            }
        } else {
            debug!("♻️ 推荐计算期间关系已变更，不写缓存: {}", uid);
        }
        computed.iter().take(limit).cloned().collect()
    }

    /// 共同好友，按 ID 排序
    pub fn mutual_friends(&self, a: &str, b: &str) -> Vec<UserId> {
        let theirs = self.graph.neighbors(b);
        self.graph.neighbors(a).iter().filter(|uid| theirs.contains(uid)).cloned().collect()
    }

    fn compute(&self, uid: &str) -> Vec<RecommendationEntry> {
        let excluded = self.graph.related(uid);
        let mut scores: HashMap<UserId, u32> = HashMap::new();
        for friend in &self.graph.neighbors(uid) {
            for candidate in &self.graph.neighbors(friend) {
                if candidate != uid && !excluded.contains(candidate) {
                    *scores.entry(candidate.clone()).or_default() += 1;
                }
            }
        }
        let mut entries: Vec<RecommendationEntry> = scores
            .into_iter()
            .map(|(candidate, shared)| RecommendationEntry {
                for_user: uid.to_string(),
                candidate,
                score: shared,
                shared_friend_count: shared,
            })
            .collect();
        entries.sort_by(|x, y| y.score.cmp(&x.score).then_with(|| x.candidate.cmp(&y.candidate)));
        entries.truncate(self.config.max_limit);
        entries
    }

    fn epoch(&self, uid: &str) -> u64 {
        self.epochs.get(uid).map(|e| *e).unwrap_or(0)
    }
}

impl GraphObserver for RecommendService {
    fn on_edge_changed(&self, change: &EdgeChange) {
        for uid in &change.affected {
            *self.epochs.entry(uid.clone()).or_default() += 1;
            self.cache.invalidate(uid);
        }
        debug!("♻️ 推荐缓存失效: {:?} -> {} 影响 {} 人", change.key, change.to, change.affected.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn befriend(graph: &FriendGraph, a: &str, b: &str) {
        graph.request_friend(a, b).unwrap();
        graph.respond_friend(b, a, true).unwrap();
    }

    fn setup() -> (Arc<FriendGraph>, Arc<RecommendService>) {
        let graph = Arc::new(FriendGraph::new());
        let service = RecommendService::new(graph.clone(), RecommendConfig::default());
        (graph, service)
    }

    fn candidates(entries: &[RecommendationEntry]) -> Vec<(&str, u32)> {
        entries.iter().map(|e| (e.candidate.as_str(), e.score)).collect()
    }

    #[test]
    fn test_second_degree_friend_is_suggested() {
        let (graph, service) = setup();
        befriend(&graph, "a", "b");
        befriend(&graph, "b", "c");

        let list = service.suggest("a", None);
        assert_eq!(candidates(&list), vec![("c", 1)]);
        assert_eq!(list[0].shared_friend_count, 1);
        assert_eq!(list[0].for_user, "a");
        assert_eq!(service.mutual_friends("a", "c"), vec!["b".to_string()]);

        let reverse = service.suggest("c", Some(10));
        assert_eq!(candidates(&reverse), vec![("a", 1)]);
        assert_eq!(reverse[0].for_user, "c");
    }

    #[test]
    fn test_scores_order_and_exclusions() {
        let (graph, service) = setup();
        for friend in ["f1", "f2", "f3"] {
            befriend(&graph, "me", friend);
        }
        // x 有三个共同好友，y / z 各一个，w 已经是待处理申请
        for friend in ["f1", "f2", "f3"] {
            befriend(&graph, friend, "x");
        }
        befriend(&graph, "f1", "z");
        befriend(&graph, "f2", "y");
        befriend(&graph, "f3", "w");
        graph.request_friend("me", "w").unwrap();
        befriend(&graph, "f1", "blocked");
        graph.block_user("me", "blocked").unwrap();

        let list = service.suggest("me", None);
        assert_eq!(candidates(&list), vec![("x", 3), ("y", 1), ("z", 1)]);
        assert_eq!(service.suggest("me", Some(1)).len(), 1);
        assert!(service.suggest("me", Some(0)).is_empty());
    }

    #[test]
    fn test_user_without_friends_gets_nothing() {
        let (_graph, service) = setup();
        assert!(service.suggest("loner", None).is_empty());
    }

    #[test]
    fn test_cache_invalidated_on_graph_change() {
        let (graph, service) = setup();
        befriend(&graph, "a", "b");
        befriend(&graph, "b", "c");
        assert_eq!(candidates(&service.suggest("a", None)), vec![("c", 1)]);

        befriend(&graph, "a", "c");
        assert!(service.suggest("a", None).is_empty());

        // 两跳外的变更同样生效：d 成为 b 的好友后出现在 a 的推荐里
        befriend(&graph, "b", "d");
        assert_eq!(candidates(&service.suggest("a", None)), vec![("d", 1)]);

        graph.remove_friend("a", "b");
        assert!(service.suggest("a", None).iter().all(|e| e.candidate != "d"));
    }
}
