//! 同步核心 - 游标、日志读取、翻译、上行批次与下行处理
//!
//! 职责划分：
//! - `cursor_store`：(start_ts, seq_id_offset) 游标的持久化
//! - `event_reader`：按游标向前翻页，探测新事件与日志翻转
//! - `translate`：事件 → 上行消息的分发与转换
//! - `uplink`：批次发送、按条回执、限次重试
//! - `downlink`：入站业务消息处理与回执
//!
//! 生命周期（连接 / 握手 / 重连）在上层 `session` 模块，不在这里。

pub mod cursor_store;
pub mod downlink;
pub mod event_reader;
pub mod translate;
pub mod uplink;

pub use cursor_store::{QueueCursor, QueueCursorStore};
pub use downlink::{DownlinkContext, DownlinkHandler, DownlinkProcessor, NoopDownlinkProcessor};
pub use event_reader::EventLogReader;
pub use translate::{JsonTranslators, TranslatorRegistry, UplinkMsgIdSeq};
pub use uplink::{UplinkBatcher, MAX_UPLINK_ATTEMPTS};
