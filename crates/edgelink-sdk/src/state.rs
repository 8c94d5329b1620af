//! 管理器共享状态
//!
//! tenant / customer / settings / queue_start_ts 只在握手期间写入，
//! 之后到下一次握手前只读；`initialized` / `sync_in_progress` 是
//! 跨线程可见的标志位：写方为会话控制器与下行处理器，读方为外层循环。

use crate::storage::EdgeSettings;
use edgelink_proto::EdgeConfiguration;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

/// 同步管理器的共享可变状态
#[derive(Debug, Default)]
pub struct SharedState {
    initialized: AtomicBool,
    sync_in_progress: AtomicBool,
    queue_start_ts: AtomicI64,
    tenant_id: RwLock<Option<Uuid>>,
    customer_id: RwLock<Option<Uuid>>,
    edge_settings: RwLock<Option<EdgeSettings>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn set_initialized(&self, value: bool) {
        self.initialized.store(value, Ordering::Release);
    }

    pub fn sync_in_progress(&self) -> bool {
        self.sync_in_progress.load(Ordering::Acquire)
    }

    pub fn set_sync_in_progress(&self, value: bool) {
        self.sync_in_progress.store(value, Ordering::Release);
    }

    pub fn queue_start_ts(&self) -> i64 {
        self.queue_start_ts.load(Ordering::Acquire)
    }

    pub fn set_queue_start_ts(&self, ts: i64) {
        self.queue_start_ts.store(ts, Ordering::Release);
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        *self.tenant_id.read().expect("tenant_id lock poisoned")
    }

    pub fn set_tenant_id(&self, tenant_id: Uuid) {
        *self.tenant_id.write().expect("tenant_id lock poisoned") = Some(tenant_id);
    }

    pub fn customer_id(&self) -> Option<Uuid> {
        *self.customer_id.read().expect("customer_id lock poisoned")
    }

    pub fn edge_settings(&self) -> Option<EdgeSettings> {
        self.edge_settings
            .read()
            .expect("edge_settings lock poisoned")
            .clone()
    }

    pub fn set_edge_settings(&self, settings: EdgeSettings) {
        *self
            .edge_settings
            .write()
            .expect("edge_settings lock poisoned") = Some(settings);
    }

    /// 依据握手/下行携带的配置更新 customer_id，返回是否发生了变化
    ///
    /// 空 UUID 视同未分配：置 None 且不算变化（与云端语义一致）。
    pub fn set_or_update_customer(&self, configuration: &EdgeConfiguration) -> bool {
        let mut customer = self.customer_id.write().expect("customer_id lock poisoned");
        match configuration.customer_id() {
            Some(new_id) => {
                let updated = *customer != Some(new_id);
                *customer = Some(new_id);
                updated
            }
            None => {
                *customer = None;
                false
            }
        }
    }
}
