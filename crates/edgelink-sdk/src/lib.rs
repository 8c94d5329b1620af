//! EdgeLink SDK - 边缘节点到云端的双向同步管理器
//!
//! 本 SDK 在边缘节点上维护一条到云端的持久化双向 RPC 同步通道：
//! - 🔁 持久化游标驱动的上行链路：翻页本地事件日志 → 翻译 → 批次发送
//! - 📨 按条回执与限次重试（at-least-once，云端幂等消费兜底）
//! - 🔌 握手 / 重连 / 关停的完整会话生命周期
//! - 📥 下行消息处理与回执，全量同步完成检测
//! - 📡 连通性上报（active / lastConnectTime / lastDisconnectTime）
//! - ⚙️ 传输、存储、翻译器、下行处理器全部走接口注入
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use edgelink_sdk::{EdgeLinkConfig, EdgeSyncManager};
//! use edgelink_sdk::storage::sqlite::SqliteStore;
//! use std::sync::Arc;
//!
//! # async fn demo(transport: Arc<dyn edgelink_sdk::transport::RpcTransport>) -> edgelink_sdk::Result<()> {
//! let config = EdgeLinkConfig::builder()
//!     .routing_key("edge-routing-key")
//!     .routing_secret("edge-secret")
//!     .reconnect_timeout_ms(10_000)
//!     .build();
//!
//! let store = Arc::new(SqliteStore::open(std::path::Path::new("/var/lib/edgelink/edge.db")).await?);
//! let manager = EdgeSyncManager::builder(config)
//!     .transport(transport)
//!     .event_store(store.clone())
//!     .attribute_store(store.clone())
//!     .attribute_notifier(store)
//!     .build()?;
//!
//! manager.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod connectivity;
pub mod error;
pub mod events;
pub mod manager;
pub mod session;
pub mod state;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod version;

pub use error::{EdgeLinkError, Result};
pub use events::{EventManager, SdkEvent};
pub use manager::{EdgeLinkConfig, EdgeSyncManager, EdgeSyncManagerBuilder, EventStorageSettings};
pub use session::{
    EdgeProvisioner, ExitHandler, NoopProvisioner, ProcessExitHandler, SessionController,
    CLOUD_TYPE_CE,
};
pub use state::SharedState;
pub use storage::{
    AttributeKvEntry, AttributeNotifier, AttributeStore, AttributeValue, EdgeSettings,
    EventLogEntry, EventLogStore, EventPage, TimeWindow, SERVER_SCOPE,
};
pub use sync::{
    DownlinkContext, DownlinkHandler, DownlinkProcessor, EventLogReader, JsonTranslators,
    NoopDownlinkProcessor, QueueCursor, QueueCursorStore, TranslatorRegistry, UplinkBatcher,
    UplinkMsgIdSeq, MAX_UPLINK_ATTEMPTS,
};
pub use transport::{RpcTransport, TransportEvent};
pub use version::SDK_VERSION;

// 协议层类型直接再导出，宿主无需单独依赖 edgelink-proto
pub use edgelink_proto::*;
