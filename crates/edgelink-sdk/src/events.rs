//! 事件系统模块 - 面向宿主的生命周期通知
//!
//! 宿主通过 `EventManager::subscribe` 观察同步进展：
//! - 连接 / 断开
//! - 批次送达 / 批次被丢弃（重试耗尽）
//! - 全量同步完成

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// SDK 事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SdkEvent {
    /// 握手完成，管理器进入已初始化状态
    Connected { tenant_id: Uuid, edge_id: Uuid },
    /// 传输错误，进入重连
    Disconnected { reason: String },
    /// 一轮外层循环成功送达的事件数与新游标
    BatchDelivered { count: usize, seq_id_offset: i64 },
    /// 重试耗尽后丢弃的消息数
    BatchDiscarded { count: usize },
    /// 云端全量同步完成
    SyncCompleted,
}

/// 事件广播管理器
#[derive(Debug)]
pub struct EventManager {
    sender: broadcast::Sender<SdkEvent>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 广播一条事件；没有订阅者时静默丢弃
    pub fn emit(&self, event: SdkEvent) {
        debug!("emit sdk event: {:?}", event);
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SdkEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let manager = EventManager::new(16);
        let mut rx = manager.subscribe();
        manager.emit(SdkEvent::SyncCompleted);
        match rx.recv().await.unwrap() {
            SdkEvent::SyncCompleted => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_noop() {
        let manager = EventManager::new(16);
        manager.emit(SdkEvent::BatchDiscarded { count: 3 });
    }
}
