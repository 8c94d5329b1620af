//! 会话控制 - 握手、重连与关停
//!
//! 状态机：
//! ```text
//!   DISCONNECTED ──connect──▶ AWAITING_HANDSHAKE
//!   AWAITING_HANDSHAKE ──edge_config(CE)──▶ HANDSHAKING ──ok──▶ RUNNING
//!   AWAITING_HANDSHAKE ──edge_config(非CE)──▶ 请求进程退出(-1)
//!   RUNNING ──transport error──▶ RECONNECT_WAIT ──定时──▶ AWAITING_HANDSHAKE
//! ```
//!
//! 握手期间写入的共享状态（tenant / settings / queue_start_ts）到下一次
//! 握手前只读。重连定时任务在下一次 edge 配置到达时取消。

use crate::connectivity::ConnectivityReporter;
use crate::error::Result;
use crate::events::{EventManager, SdkEvent};
use crate::state::SharedState;
use crate::storage::{EdgeSettings, EventLogStore};
use crate::sync::cursor_store::QueueCursorStore;
use crate::transport::RpcTransport;
use async_trait::async_trait;
use edgelink_proto::{ActionType, EdgeConfiguration, EntityType};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, trace};
use uuid::Uuid;

/// 本边缘版本唯一接受的云端类型
pub const CLOUD_TYPE_CE: &str = "CE";

/// 进程退出钩子（云端类型不匹配时触发）
pub trait ExitHandler: Send + Sync {
    fn request_exit(&self, code: i32);
}

/// 缺省实现：直接退出进程
pub struct ProcessExitHandler;

impl ExitHandler for ProcessExitHandler {
    fn request_exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// 租户 / 客户 / 边缘记录的本地供给（外部协作方）
#[async_trait]
pub trait EdgeProvisioner: Send + Sync {
    /// 边缘身份变化时清理旧租户数据
    async fn clean_up(&self, tenant_id: Uuid) -> Result<()>;

    async fn create_tenant_if_not_exists(&self, tenant_id: Uuid, queue_start_ts: i64)
        -> Result<()>;

    async fn create_customer_if_not_exists(
        &self,
        tenant_id: Uuid,
        configuration: &EdgeConfiguration,
    ) -> Result<()>;

    /// 把握手里的边缘配置落到本地边缘记录
    async fn process_edge_configuration(
        &self,
        tenant_id: Uuid,
        configuration: &EdgeConfiguration,
    ) -> Result<()>;
}

/// 不做本地供给的缺省实现
pub struct NoopProvisioner;

#[async_trait]
impl EdgeProvisioner for NoopProvisioner {
    async fn clean_up(&self, _tenant_id: Uuid) -> Result<()> {
        Ok(())
    }

    async fn create_tenant_if_not_exists(
        &self,
        _tenant_id: Uuid,
        _queue_start_ts: i64,
    ) -> Result<()> {
        Ok(())
    }

    async fn create_customer_if_not_exists(
        &self,
        _tenant_id: Uuid,
        _configuration: &EdgeConfiguration,
    ) -> Result<()> {
        Ok(())
    }

    async fn process_edge_configuration(
        &self,
        _tenant_id: Uuid,
        _configuration: &EdgeConfiguration,
    ) -> Result<()> {
        Ok(())
    }
}

pub struct SessionController {
    transport: Arc<dyn RpcTransport>,
    state: Arc<SharedState>,
    cursor_store: Arc<QueueCursorStore>,
    event_store: Arc<dyn EventLogStore>,
    provisioner: Arc<dyn EdgeProvisioner>,
    connectivity: Arc<ConnectivityReporter>,
    exit_handler: Arc<dyn ExitHandler>,
    events: Arc<EventManager>,
    routing_key: String,
    routing_secret: String,
    reconnect_timeout_ms: u64,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        state: Arc<SharedState>,
        cursor_store: Arc<QueueCursorStore>,
        event_store: Arc<dyn EventLogStore>,
        provisioner: Arc<dyn EdgeProvisioner>,
        connectivity: Arc<ConnectivityReporter>,
        exit_handler: Arc<dyn ExitHandler>,
        events: Arc<EventManager>,
        routing_key: String,
        routing_secret: String,
        reconnect_timeout_ms: u64,
    ) -> Self {
        Self {
            transport,
            state,
            cursor_store,
            event_store,
            provisioner,
            connectivity,
            exit_handler,
            events,
            routing_key,
            routing_secret,
            reconnect_timeout_ms,
            reconnect_task: Mutex::new(None),
        }
    }

    /// 处理握手 / 配置变更
    pub async fn on_edge_update(&self, configuration: EdgeConfiguration) {
        self.cancel_reconnect().await;

        if configuration.cloud_type != CLOUD_TYPE_CE {
            error!("Terminating application. CE edge can be connected only to CE server version...");
            self.exit_handler.request_exit(-1);
            return;
        }
        if let Err(e) = self.init_and_update_edge_settings(configuration).await {
            error!("Can't process edge configuration message: {}", e);
        }
    }

    async fn init_and_update_edge_settings(
        &self,
        configuration: EdgeConfiguration,
    ) -> Result<()> {
        let tenant_id = configuration.tenant_id;
        self.state.set_tenant_id(tenant_id);

        let stored = self.event_store.find_edge_settings(tenant_id).await?;
        let new_settings = EdgeSettings::from_configuration(&configuration);
        let current = match stored {
            Some(settings) if settings.edge_id == new_settings.edge_id => {
                trace!("Using edge settings from storage {:?}", settings);
                settings
            }
            _ => {
                // 边缘身份变化：旧租户数据作废
                self.provisioner.clean_up(tenant_id).await?;
                new_settings
            }
        };

        let queue_start_ts = self.cursor_store.load().await?.start_ts;
        self.state.set_queue_start_ts(queue_start_ts);

        self.provisioner
            .create_tenant_if_not_exists(tenant_id, queue_start_ts)
            .await?;
        let edge_customer_id_updated = self.state.set_or_update_customer(&configuration);
        if edge_customer_id_updated {
            self.provisioner
                .create_customer_if_not_exists(tenant_id, &configuration)
                .await?;
        }

        trace!(
            "Sending sync request, full_sync_required {}, edge_customer_id_updated {}",
            current.full_sync_required,
            edge_customer_id_updated
        );
        // 按位或：两侧都已求值，保留原意
        self.transport
            .send_sync_request(current.full_sync_required | edge_customer_id_updated, true)
            .await?;
        self.state.set_sync_in_progress(true);

        self.event_store
            .save_edge_settings(tenant_id, &current)
            .await?;
        self.state.set_edge_settings(current);

        self.provisioner
            .process_edge_configuration(tenant_id, &configuration)
            .await?;
        self.save_bootstrap_events(tenant_id, configuration.edge_id, queue_start_ts)
            .await?;

        self.connectivity.publish(true).await;
        self.state.set_initialized(true);
        self.events.emit(SdkEvent::Connected {
            tenant_id,
            edge_id: configuration.edge_id,
        });
        Ok(())
    }

    /// 把两条引导事件写进本地事件日志，让它们走常规上行路径
    async fn save_bootstrap_events(
        &self,
        tenant_id: Uuid,
        edge_id: Uuid,
        queue_start_ts: i64,
    ) -> Result<()> {
        self.event_store
            .save_event(
                tenant_id,
                EntityType::Edge,
                ActionType::AttributesRequest,
                Some(edge_id),
                None,
                queue_start_ts,
            )
            .await?;
        self.event_store
            .save_event(
                tenant_id,
                EntityType::Edge,
                ActionType::RelationRequest,
                Some(edge_id),
                None,
                queue_start_ts,
            )
            .await
    }

    /// 传输错误：退出初始化态并启动固定频率重连
    pub async fn schedule_reconnect(&self, reason: String) {
        self.state.set_initialized(false);
        self.connectivity.publish(false).await;
        self.events.emit(SdkEvent::Disconnected {
            reason: reason.clone(),
        });

        let mut task = self.reconnect_task.lock().await;
        if task.is_some() {
            return;
        }

        let transport = self.transport.clone();
        let routing_key = self.routing_key.clone();
        let routing_secret = self.routing_secret.clone();
        let period = std::time::Duration::from_millis(self.reconnect_timeout_ms);
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval 的首个 tick 立即返回；原语义是先等一个周期
            ticker.tick().await;
            loop {
                ticker.tick().await;
                info!("Trying to reconnect due to the error: {}!", reason);
                if let Err(e) = transport.disconnect(true).await {
                    error!("Exception during disconnect: {}", e);
                }
                if let Err(e) = transport.connect(&routing_key, &routing_secret).await {
                    error!("Exception during connect: {}", e);
                }
            }
        }));
    }

    async fn cancel_reconnect(&self) {
        if let Some(task) = self.reconnect_task.lock().await.take() {
            task.abort();
        }
    }

    /// 关停：取消重连定时器（连通性与断连由管理器负责收尾）
    pub async fn stop(&self) {
        self.cancel_reconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryAttributeStore, InMemoryEventStore};
    use crate::transport::MockTransport;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
    use std::time::Duration;

    struct RecordingProvisioner {
        clean_ups: AtomicUsize,
        tenants: AtomicUsize,
        customers: AtomicUsize,
        edge_configs: AtomicUsize,
    }

    impl RecordingProvisioner {
        fn new() -> Self {
            Self {
                clean_ups: AtomicUsize::new(0),
                tenants: AtomicUsize::new(0),
                customers: AtomicUsize::new(0),
                edge_configs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EdgeProvisioner for RecordingProvisioner {
        async fn clean_up(&self, _tenant_id: Uuid) -> Result<()> {
            self.clean_ups.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }

        async fn create_tenant_if_not_exists(
            &self,
            _tenant_id: Uuid,
            _queue_start_ts: i64,
        ) -> Result<()> {
            self.tenants.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }

        async fn create_customer_if_not_exists(
            &self,
            _tenant_id: Uuid,
            _configuration: &EdgeConfiguration,
        ) -> Result<()> {
            self.customers.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }

        async fn process_edge_configuration(
            &self,
            _tenant_id: Uuid,
            _configuration: &EdgeConfiguration,
        ) -> Result<()> {
            self.edge_configs.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }
    }

    struct RecordingExit {
        code: AtomicI32,
    }

    impl ExitHandler for RecordingExit {
        fn request_exit(&self, code: i32) {
            self.code.store(code, Ordering::Release);
        }
    }

    struct Harness {
        controller: SessionController,
        transport: Arc<MockTransport>,
        state: Arc<SharedState>,
        event_store: Arc<InMemoryEventStore>,
        attributes: Arc<InMemoryAttributeStore>,
        provisioner: Arc<RecordingProvisioner>,
        exit: Arc<RecordingExit>,
    }

    fn harness(reconnect_timeout_ms: u64) -> Harness {
        let transport = Arc::new(MockTransport::new());
        let state = Arc::new(SharedState::new());
        let attributes = Arc::new(InMemoryAttributeStore::new());
        let event_store = Arc::new(InMemoryEventStore::new());
        let provisioner = Arc::new(RecordingProvisioner::new());
        let exit = Arc::new(RecordingExit {
            code: AtomicI32::new(0),
        });
        let cursor_store = Arc::new(QueueCursorStore::new(attributes.clone(), state.clone()));
        let connectivity = Arc::new(ConnectivityReporter::new(attributes.clone(), state.clone()));
        let controller = SessionController::new(
            transport.clone(),
            state.clone(),
            cursor_store,
            event_store.clone(),
            provisioner.clone(),
            connectivity,
            exit.clone(),
            Arc::new(EventManager::default()),
            "rk".into(),
            "secret".into(),
            reconnect_timeout_ms,
        );
        Harness {
            controller,
            transport,
            state,
            event_store,
            attributes,
            provisioner,
            exit,
        }
    }

    fn ce_configuration(tenant_id: Uuid, edge_id: Uuid) -> EdgeConfiguration {
        EdgeConfiguration {
            tenant_id,
            edge_id,
            customer_id: None,
            name: "edge-1".into(),
            edge_type: "default".into(),
            routing_key: "rk".into(),
            cloud_type: CLOUD_TYPE_CE.into(),
        }
    }

    #[tokio::test]
    async fn handshake_initializes_manager() {
        let h = harness(60_000);
        let tenant = Uuid::now_v7();
        let edge = Uuid::now_v7();
        h.controller.on_edge_update(ce_configuration(tenant, edge)).await;

        assert!(h.state.is_initialized());
        assert!(h.state.sync_in_progress());
        assert_eq!(h.state.tenant_id(), Some(tenant));
        assert!(h.state.edge_settings().is_some());
        // 全新边缘：full_sync_required=true
        assert_eq!(*h.transport.sync_requests.lock().unwrap(), vec![(true, true)]);
        // 两条引导事件已入本地日志
        let events = h.event_store.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, ActionType::AttributesRequest);
        assert_eq!(events[1].action, ActionType::RelationRequest);
        drop(events);
        // 连通性已上报
        assert!(h
            .attributes
            .get(tenant, crate::storage::SERVER_SCOPE, "active")
            .is_some());
        assert_eq!(h.provisioner.tenants.load(Ordering::Acquire), 1);
    }

    #[tokio::test]
    async fn known_edge_without_full_sync_requests_incremental() {
        let h = harness(60_000);
        let tenant = Uuid::now_v7();
        let edge = Uuid::now_v7();
        h.event_store
            .save_edge_settings(
                tenant,
                &EdgeSettings {
                    edge_id: edge,
                    tenant_id: tenant,
                    name: "edge-1".into(),
                    edge_type: "default".into(),
                    routing_key: "rk".into(),
                    full_sync_required: false,
                },
            )
            .await
            .unwrap();

        h.controller.on_edge_update(ce_configuration(tenant, edge)).await;
        // 已知边缘且无客户变更：不全量
        assert_eq!(*h.transport.sync_requests.lock().unwrap(), vec![(false, true)]);
        assert_eq!(h.provisioner.clean_ups.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn changed_edge_id_triggers_clean_up() {
        let h = harness(60_000);
        let tenant = Uuid::now_v7();
        h.event_store
            .save_edge_settings(
                tenant,
                &EdgeSettings {
                    edge_id: Uuid::now_v7(),
                    tenant_id: tenant,
                    name: "old".into(),
                    edge_type: "default".into(),
                    routing_key: "rk".into(),
                    full_sync_required: false,
                },
            )
            .await
            .unwrap();

        h.controller
            .on_edge_update(ce_configuration(tenant, Uuid::now_v7()))
            .await;
        assert_eq!(h.provisioner.clean_ups.load(Ordering::Acquire), 1);
        // 重建的设置要求全量
        assert_eq!(*h.transport.sync_requests.lock().unwrap(), vec![(true, true)]);
    }

    #[tokio::test]
    async fn customer_assignment_forces_full_sync() {
        let h = harness(60_000);
        let tenant = Uuid::now_v7();
        let edge = Uuid::now_v7();
        h.event_store
            .save_edge_settings(
                tenant,
                &EdgeSettings {
                    edge_id: edge,
                    tenant_id: tenant,
                    name: "edge-1".into(),
                    edge_type: "default".into(),
                    routing_key: "rk".into(),
                    full_sync_required: false,
                },
            )
            .await
            .unwrap();

        let mut configuration = ce_configuration(tenant, edge);
        configuration.customer_id = Some(Uuid::now_v7());
        h.controller.on_edge_update(configuration).await;
        // full_sync_required=false 但客户变更 → 按位或后仍是全量
        assert_eq!(*h.transport.sync_requests.lock().unwrap(), vec![(true, true)]);
        assert_eq!(h.provisioner.customers.load(Ordering::Acquire), 1);
    }

    #[tokio::test]
    async fn non_ce_cloud_requests_process_exit() {
        let h = harness(60_000);
        let mut configuration = ce_configuration(Uuid::now_v7(), Uuid::now_v7());
        configuration.cloud_type = "PE".into();
        h.controller.on_edge_update(configuration).await;

        assert_eq!(h.exit.code.load(Ordering::Acquire), -1);
        assert!(!h.state.is_initialized());
        assert!(h.transport.sync_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reconnect_fires_at_fixed_rate_until_cancelled() {
        let h = harness(20);
        h.state.set_initialized(true);
        h.state.set_tenant_id(Uuid::now_v7());

        h.controller.schedule_reconnect("stream broken".into()).await;
        assert!(!h.state.is_initialized());

        tokio::time::sleep(Duration::from_millis(90)).await;
        let connects = h.transport.connect_calls.load(Ordering::Acquire);
        assert!(connects >= 2, "expected repeated reconnects, got {}", connects);
        assert!(h.transport.disconnect_calls.load(Ordering::Acquire) >= 2);

        // 握手到达后定时器取消
        h.controller
            .on_edge_update(ce_configuration(Uuid::now_v7(), Uuid::now_v7()))
            .await;
        // 让在途的最后一次 tick 收尾后再取稳定值
        tokio::time::sleep(Duration::from_millis(30)).await;
        let settled = h.transport.connect_calls.load(Ordering::Acquire);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(h.transport.connect_calls.load(Ordering::Acquire), settled);
    }

    #[tokio::test]
    async fn duplicate_transport_errors_reuse_one_timer() {
        let h = harness(20);
        h.controller.schedule_reconnect("e1".into()).await;
        h.controller.schedule_reconnect("e2".into()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.controller.stop().await;
        let connects = h.transport.connect_calls.load(Ordering::Acquire);
        // 只有一个定时器在跑（两个会 double）
        assert!(connects <= 3, "single timer expected, got {} connects", connects);
    }
}
