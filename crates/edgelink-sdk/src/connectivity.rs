//! 连通性上报
//!
//! 把 active / lastConnectTime / lastDisconnectTime 写到租户的 server
//! 作用域属性。尽力而为：成功 trace，失败 warn，绝不阻塞会话流程；
//! tenant 未知时整体 no-op。

use crate::state::SharedState;
use crate::storage::{AttributeNotifier, AttributeValue, SERVER_SCOPE};
use chrono::Utc;
use std::sync::Arc;
use tracing::{trace, warn};
use uuid::Uuid;

pub const ACTIVITY_STATE_KEY: &str = "active";
pub const LAST_CONNECT_TIME_KEY: &str = "lastConnectTime";
pub const LAST_DISCONNECT_TIME_KEY: &str = "lastDisconnectTime";

pub struct ConnectivityReporter {
    notifier: Arc<dyn AttributeNotifier>,
    state: Arc<SharedState>,
}

impl ConnectivityReporter {
    pub fn new(notifier: Arc<dyn AttributeNotifier>, state: Arc<SharedState>) -> Self {
        Self { notifier, state }
    }

    pub async fn publish(&self, active: bool) {
        let Some(tenant_id) = self.state.tenant_id() else {
            return;
        };
        self.save(tenant_id, ACTIVITY_STATE_KEY, AttributeValue::Bool(active))
            .await;
        let now = Utc::now().timestamp_millis();
        if active {
            self.save(tenant_id, LAST_CONNECT_TIME_KEY, AttributeValue::Long(now))
                .await;
        } else {
            self.save(tenant_id, LAST_DISCONNECT_TIME_KEY, AttributeValue::Long(now))
                .await;
        }
    }

    async fn save(&self, tenant_id: Uuid, key: &str, value: AttributeValue) {
        match self
            .notifier
            .save_attribute(tenant_id, SERVER_SCOPE, key, value.clone())
            .await
        {
            Ok(()) => trace!("Successfully updated attribute [{}] with value [{:?}]", key, value),
            Err(e) => warn!("Failed to update attribute [{}] with value [{:?}]: {}", key, value, e),
        }
    }
}
