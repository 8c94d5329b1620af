//! 统一入口 - EdgeSyncManager 同步管理器
//!
//! 分层架构：
//! ```text
//! EdgeSyncManager (门面 / 外层循环)
//!   ├── SessionController (握手 / 重连 / 关停)
//!   ├── EventLogReader + TranslatorRegistry + UplinkBatcher (上行链路)
//!   ├── DownlinkHandler (下行链路)
//!   ├── QueueCursorStore (游标持久化)
//!   └── ConnectivityReporter (连通性上报)
//! ```
//!
//! 线程模型：
//! - 外层循环 worker（1 个）：翻页 → 翻译 → 批次发送 → 推进游标
//! - 派发任务（1 个）：消费传输事件流，回执不阻塞，下行另起任务
//! - 重连定时任务：见 SessionController
//! - 凭证缺失时只有一个每 10 秒告警的任务，不建连

use crate::connectivity::ConnectivityReporter;
use crate::error::{EdgeLinkError, Result};
use crate::events::{EventManager, SdkEvent};
use crate::session::{
    EdgeProvisioner, ExitHandler, NoopProvisioner, ProcessExitHandler, SessionController,
};
use crate::state::SharedState;
use crate::storage::{AttributeNotifier, AttributeStore, EventLogEntry, EventLogStore};
use crate::sync::cursor_store::{QueueCursor, QueueCursorStore};
use crate::sync::downlink::{DownlinkHandler, DownlinkProcessor, NoopDownlinkProcessor};
use crate::sync::event_reader::EventLogReader;
use crate::sync::translate::TranslatorRegistry;
use crate::sync::uplink::UplinkBatcher;
use crate::transport::{RpcTransport, TransportEvent};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, trace, warn};

/// 事件日志读取与批次节奏配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStorageSettings {
    /// 单页最大读取条数
    pub max_read_records_count: usize,
    /// 无新事件时的休眠（ms）
    pub no_records_sleep_interval_ms: u64,
    /// 批次重试之间的休眠（ms）
    pub sleep_interval_between_batches_ms: u64,
}

impl Default for EventStorageSettings {
    fn default() -> Self {
        Self {
            max_read_records_count: 50,
            no_records_sleep_interval_ms: 60_000,
            sleep_interval_between_batches_ms: 60_000,
        }
    }
}

/// 管理器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeLinkConfig {
    /// 云端分配的路由键
    pub routing_key: String,
    /// 云端分配的密钥
    pub routing_secret: String,
    /// 重连间隔（ms）
    pub reconnect_timeout_ms: u64,
    pub storage_settings: EventStorageSettings,
}

impl EdgeLinkConfig {
    pub fn builder() -> EdgeLinkConfigBuilder {
        EdgeLinkConfigBuilder::default()
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct EdgeLinkConfigBuilder {
    routing_key: Option<String>,
    routing_secret: Option<String>,
    reconnect_timeout_ms: Option<u64>,
    storage_settings: Option<EventStorageSettings>,
}

impl EdgeLinkConfigBuilder {
    pub fn routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_key = Some(key.into());
        self
    }

    pub fn routing_secret(mut self, secret: impl Into<String>) -> Self {
        self.routing_secret = Some(secret.into());
        self
    }

    pub fn reconnect_timeout_ms(mut self, timeout: u64) -> Self {
        self.reconnect_timeout_ms = Some(timeout);
        self
    }

    pub fn storage_settings(mut self, settings: EventStorageSettings) -> Self {
        self.storage_settings = Some(settings);
        self
    }

    pub fn build(self) -> EdgeLinkConfig {
        EdgeLinkConfig {
            routing_key: self.routing_key.unwrap_or_default(),
            routing_secret: self.routing_secret.unwrap_or_default(),
            reconnect_timeout_ms: self.reconnect_timeout_ms.unwrap_or(10_000),
            storage_settings: self.storage_settings.unwrap_or_default(),
        }
    }
}

/// 管理器构建器：传输与存储必须注入，其余有缺省实现
pub struct EdgeSyncManagerBuilder {
    config: EdgeLinkConfig,
    transport: Option<Arc<dyn RpcTransport>>,
    event_store: Option<Arc<dyn EventLogStore>>,
    attribute_store: Option<Arc<dyn AttributeStore>>,
    notifier: Option<Arc<dyn AttributeNotifier>>,
    provisioner: Arc<dyn EdgeProvisioner>,
    downlink_processor: Arc<dyn DownlinkProcessor>,
    translators: Option<TranslatorRegistry>,
    exit_handler: Arc<dyn ExitHandler>,
}

impl EdgeSyncManagerBuilder {
    pub fn new(config: EdgeLinkConfig) -> Self {
        Self {
            config,
            transport: None,
            event_store: None,
            attribute_store: None,
            notifier: None,
            provisioner: Arc::new(NoopProvisioner),
            downlink_processor: Arc::new(NoopDownlinkProcessor),
            translators: None,
            exit_handler: Arc::new(ProcessExitHandler),
        }
    }

    pub fn transport(mut self, transport: Arc<dyn RpcTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn event_store(mut self, store: Arc<dyn EventLogStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn attribute_store(mut self, store: Arc<dyn AttributeStore>) -> Self {
        self.attribute_store = Some(store);
        self
    }

    pub fn attribute_notifier(mut self, notifier: Arc<dyn AttributeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn provisioner(mut self, provisioner: Arc<dyn EdgeProvisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn downlink_processor(mut self, processor: Arc<dyn DownlinkProcessor>) -> Self {
        self.downlink_processor = processor;
        self
    }

    pub fn translators(mut self, registry: TranslatorRegistry) -> Self {
        self.translators = Some(registry);
        self
    }

    pub fn exit_handler(mut self, handler: Arc<dyn ExitHandler>) -> Self {
        self.exit_handler = handler;
        self
    }

    pub fn build(self) -> Result<Arc<EdgeSyncManager>> {
        let transport = self
            .transport
            .ok_or_else(|| EdgeLinkError::Config("transport 未注入".into()))?;
        let event_store = self
            .event_store
            .ok_or_else(|| EdgeLinkError::Config("event_store 未注入".into()))?;
        let attribute_store = self
            .attribute_store
            .ok_or_else(|| EdgeLinkError::Config("attribute_store 未注入".into()))?;
        let notifier = self
            .notifier
            .ok_or_else(|| EdgeLinkError::Config("attribute_notifier 未注入".into()))?;

        let config = self.config;
        let state = Arc::new(SharedState::new());
        let events = Arc::new(EventManager::default());
        let cursor_store = Arc::new(QueueCursorStore::new(attribute_store, state.clone()));
        let connectivity = Arc::new(ConnectivityReporter::new(notifier, state.clone()));
        let reader = EventLogReader::new(
            event_store.clone(),
            state.clone(),
            config.storage_settings.max_read_records_count,
        );
        let batcher = Arc::new(UplinkBatcher::new(
            transport.clone(),
            state.clone(),
            events.clone(),
            Duration::from_millis(config.storage_settings.sleep_interval_between_batches_ms),
        ));
        let downlink = Arc::new(DownlinkHandler::new(
            transport.clone(),
            state.clone(),
            self.downlink_processor,
            events.clone(),
            config.routing_key.clone(),
        ));
        let session = Arc::new(SessionController::new(
            transport.clone(),
            state.clone(),
            cursor_store.clone(),
            event_store,
            self.provisioner,
            connectivity.clone(),
            self.exit_handler,
            events.clone(),
            config.routing_key.clone(),
            config.routing_secret.clone(),
            config.reconnect_timeout_ms,
        ));
        let registry = self
            .translators
            .unwrap_or_else(TranslatorRegistry::with_json_defaults);

        Ok(Arc::new(EdgeSyncManager {
            config,
            state,
            events,
            transport,
            cursor_store,
            reader,
            registry,
            batcher,
            downlink,
            session,
            connectivity,
            shutdown: Arc::new(Notify::new()),
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }))
    }
}

/// 边缘-云同步管理器
pub struct EdgeSyncManager {
    config: EdgeLinkConfig,
    state: Arc<SharedState>,
    events: Arc<EventManager>,
    transport: Arc<dyn RpcTransport>,
    cursor_store: Arc<QueueCursorStore>,
    reader: EventLogReader,
    registry: TranslatorRegistry,
    batcher: Arc<UplinkBatcher>,
    downlink: Arc<DownlinkHandler>,
    session: Arc<SessionController>,
    connectivity: Arc<ConnectivityReporter>,
    shutdown: Arc<Notify>,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EdgeSyncManager {
    pub fn builder(config: EdgeLinkConfig) -> EdgeSyncManagerBuilder {
        EdgeSyncManagerBuilder::new(config)
    }

    /// 启动管理器。凭证为空时进入告警循环，不建连。
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(EdgeLinkError::InvalidOperation("管理器已启动".into()));
        }

        if !self.validate_routing_key_and_secret().await {
            return Ok(());
        }

        info!("Starting EdgeLink cloud sync service");

        // 先订阅后连接，避免丢早到的事件
        let receiver = self.transport.subscribe();
        let dispatcher = self.clone();
        self.tasks
            .lock()
            .await
            .push(tokio::spawn(async move { dispatcher.run_dispatch(receiver).await }));

        if let Err(e) = self
            .transport
            .connect(&self.config.routing_key, &self.config.routing_secret)
            .await
        {
            error!("Exception during connect: {}", e);
            self.session.schedule_reconnect(e.to_string()).await;
        }

        let worker = self.clone();
        self.tasks
            .lock()
            .await
            .push(tokio::spawn(async move { worker.run_sync_loop().await }));
        Ok(())
    }

    async fn validate_routing_key_and_secret(self: &Arc<Self>) -> bool {
        let blank = self.config.routing_key.trim().is_empty()
            || self.config.routing_secret.trim().is_empty();
        if blank {
            let shutdown = self.shutdown.clone();
            self.tasks.lock().await.push(tokio::spawn(async move {
                loop {
                    error!(
                        "Routing Key and Routing Secret must be provided! \
                         Please configure cloud.routing_key and cloud.routing_secret. \
                         EdgeLink is not going to connect to cloud!"
                    );
                    tokio::select! {
                        _ = shutdown.notified() => break,
                        _ = sleep(Duration::from_secs(10)) => {}
                    }
                }
            }));
        }
        !blank
    }

    /// 消费传输事件流：回执同步处理，下行另起任务，错误触发重连
    async fn run_dispatch(self: Arc<Self>, mut receiver: broadcast::Receiver<TransportEvent>) {
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                event = receiver.recv() => match event {
                    Ok(TransportEvent::UplinkAck(ack)) => self.batcher.on_uplink_response(ack),
                    Ok(TransportEvent::EdgeConfig(configuration)) => {
                        self.session.on_edge_update(configuration).await;
                    }
                    Ok(TransportEvent::Downlink(msg)) => {
                        let handler = self.downlink.clone();
                        tokio::spawn(async move { handler.process(msg).await });
                    }
                    Ok(TransportEvent::Error(reason)) => {
                        self.session.schedule_reconnect(reason).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Transport event stream lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// 外层循环：游标 → 活性探测 → 翻页 → 翻译 → 批次 → 推进游标
    async fn run_sync_loop(self: Arc<Self>) {
        info!("Starting cloud event processing loop");
        loop {
            if !self.state.is_initialized() {
                if self.sleep_or_shutdown(Duration::from_secs(1)).await {
                    break;
                }
                continue;
            }
            if let Err(e) = self.process_cloud_events().await {
                warn!("Failed to process messages handling! {}", e);
            }
            if self
                .sleep_or_shutdown(Duration::from_millis(
                    self.config.storage_settings.no_records_sleep_interval_ms,
                ))
                .await
            {
                break;
            }
        }
        info!("Cloud event processing loop stopped");
    }

    /// 返回 true = 收到关停信号
    async fn sleep_or_shutdown(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.notified() => true,
            _ = sleep(duration) => false,
        }
    }

    async fn process_cloud_events(&self) -> Result<()> {
        let cursor = self.cursor_store.load().await?;
        self.state.set_queue_start_ts(cursor.start_ts);
        let window = self.reader.current_window(cursor.start_ts);

        if !self
            .reader
            .new_events_available(cursor.seq_id_offset, &window)
            .await?
        {
            return Ok(());
        }

        let tenant_id = self.state.tenant_id().ok_or_else(|| {
            EdgeLinkError::NotInitialized("tenant id 未知，无法翻译事件".into())
        })?;

        let mut seq_id_offset = cursor.seq_id_offset;
        let mut last_shipped: Option<EventLogEntry> = None;
        let mut delivered = 0usize;

        loop {
            if !self.state.is_initialized() {
                break;
            }
            let mut page = self.reader.read_page(seq_id_offset, &window).await?;
            if page.items.is_empty() {
                info!("seq_id of the event log started a new cycle");
                page = self.reader.read_wrap_page(&window).await?;
            }
            if page.items.is_empty() {
                break;
            }

            trace!("[{}] event(s) are going to be converted.", page.items.len());
            let msgs = self.registry.convert_all(tenant_id, &page.items);
            let success = if msgs.is_empty() {
                true
            } else {
                self.batcher.send_batch(msgs).await?
            };
            if !success {
                // 批次被放弃（中途退出初始化态）：游标不推进
                break;
            }

            let last = page.items.last().expect("non-empty page").clone();
            seq_id_offset = last.seq_id;
            delivered += page.items.len();
            let has_next = page.has_next;
            last_shipped = Some(last);
            if !has_next {
                break;
            }
        }

        if let Some(last) = last_shipped {
            match last.uuid_timestamp_ms() {
                Some(new_start_ts) => {
                    self.cursor_store
                        .store(QueueCursor {
                            start_ts: new_start_ts,
                            seq_id_offset,
                        })
                        .await;
                    self.events.emit(SdkEvent::BatchDelivered {
                        count: delivered,
                        seq_id_offset,
                    });
                }
                None => error!(
                    "[{}] Failed to update queue offset: uuid carries no timestamp",
                    last.uuid
                ),
            }
        }
        Ok(())
    }

    /// 关停：发布离线、尽力断连、停掉所有 worker
    pub async fn shutdown(&self) -> Result<()> {
        let edge_id = self
            .state
            .edge_settings()
            .map(|s| s.edge_id.to_string())
            .unwrap_or_default();
        info!("[{}] Starting destroying process", edge_id);

        self.state.set_initialized(false);
        self.connectivity.publish(false).await;
        if let Err(e) = self.transport.disconnect(false).await {
            error!("Exception during disconnect: {}", e);
        }
        self.session.stop().await;
        self.shutdown.notify_waiters();
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.running.store(false, Ordering::Release);
        info!("[{}] Destroy was successful", edge_id);
        Ok(())
    }

    /// 订阅 SDK 生命周期事件
    pub fn subscribe_events(&self) -> broadcast::Receiver<SdkEvent> {
        self.events.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    pub fn sync_in_progress(&self) -> bool {
        self.state.sync_in_progress()
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &Arc<SharedState> {
        &self.state
    }
}
