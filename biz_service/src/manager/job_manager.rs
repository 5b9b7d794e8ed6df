use crate::biz_service::chat_service::ChatService;
use crate::entitys::user_entity::PresenceEvent;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// 后台任务：心跳超时清理、在线状态推送
pub struct JobManager {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl JobManager {
    pub fn start(service: Arc<ChatService>) -> Self {
        let cancel = CancellationToken::new();
        let period = service.config().get_presence().sweep_interval();
        // 在启动时订阅，避免任务调度前的事件丢失
        let events = service.presence().subscribe();
        let tasks = vec![
            tokio::spawn(heartbeat_sweeper(service.clone(), period, cancel.clone())),
            tokio::spawn(presence_relay(service, events, cancel.clone())),
        ];
        info!("⏰ 后台任务已启动，心跳检查间隔 {:?}", period);
        Self { cancel, tasks }
    }

    /// 停止所有后台任务并等待退出
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("⚠️ 后台任务退出异常: {}", e);
            }
        }
        info!("🛑 后台任务已停止");
    }
}

async fn heartbeat_sweeper(service: Arc<ChatService>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let removed = service.presence().sweep_expired();
                if removed > 0 {
                    info!(
                        "🧹 清理超时连接 {} 个，当前连接数 {} 在线用户 {}",
                        removed,
                        service.presence().connection_count(),
                        service.presence().online_user_count()
                    );
                }
            }
        }
    }
}

async fn presence_relay(service: Arc<ChatService>, mut events: broadcast::Receiver<PresenceEvent>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    service.notify_presence(&event).await;
                }
                Err(RecvError::Lagged(skipped)) => warn!("⚠️ 在线状态事件积压，丢弃 {} 条", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }
}
