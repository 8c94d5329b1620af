//! 传输层接口 - 持久化双向 RPC 流的能力边界
//!
//! 具体传输（gRPC / QUIC / WebSocket）由宿主注入；SDK 只依赖：
//! - 四类入站回调统一成 `TransportEvent` 广播流（回调线程不阻塞）
//! - 出站的 uplink / downlink-response / sync-request 发送
//! - 服务端协商的 max inbound size（0 表示不限制）

use crate::error::Result;
use async_trait::async_trait;
use edgelink_proto::{DownlinkMsg, DownlinkResponseMsg, EdgeConfiguration, UplinkMsg, UplinkResponseMsg};
use tokio::sync::broadcast;

/// 入站事件，由传输实现投递到广播通道
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// 对某条上行消息的回执
    UplinkAck(UplinkResponseMsg),
    /// 握手 / 配置变更
    EdgeConfig(EdgeConfiguration),
    /// 下行业务消息
    Downlink(DownlinkMsg),
    /// 传输错误（触发重连）
    Error(String),
}

/// RPC 传输客户端
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// 建立连接；入站事件随后出现在 `subscribe` 的通道上
    async fn connect(&self, routing_key: &str, routing_secret: &str) -> Result<()>;

    async fn disconnect(&self, graceful: bool) -> Result<()>;

    async fn send_uplink(&self, msg: UplinkMsg) -> Result<()>;

    async fn send_downlink_response(&self, msg: DownlinkResponseMsg) -> Result<()>;

    async fn send_sync_request(&self, full_sync: bool, reset_sync: bool) -> Result<()>;

    /// 服务端最大入站消息字节数；0 = 未协商，不过滤
    fn server_max_inbound_size(&self) -> usize;

    /// 订阅入站事件流；通道归传输所有，跨重连存活
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 回执策略
    #[derive(Debug, Clone)]
    pub enum AckMode {
        /// 全部正向回执
        AckAll,
        /// 不回执（触发 latch 超时）
        AckNone,
        /// 指定 id 首次发送不回执，重发后正向回执
        DropOnce(HashSet<i32>),
        /// 全部负向回执
        NackAll,
    }

    /// 测试用传输：记录出站消息，按策略自动回执
    pub struct MockTransport {
        events: broadcast::Sender<TransportEvent>,
        pub sent_uplinks: Mutex<Vec<UplinkMsg>>,
        pub sync_requests: Mutex<Vec<(bool, bool)>>,
        pub downlink_responses: Mutex<Vec<DownlinkResponseMsg>>,
        pub connect_calls: AtomicUsize,
        pub disconnect_calls: AtomicUsize,
        max_inbound_size: AtomicUsize,
        ack_mode: Mutex<AckMode>,
        dropped: Mutex<HashSet<i32>>,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            let (events, _) = broadcast::channel(512);
            Self {
                events,
                sent_uplinks: Mutex::new(Vec::new()),
                sync_requests: Mutex::new(Vec::new()),
                downlink_responses: Mutex::new(Vec::new()),
                connect_calls: AtomicUsize::new(0),
                disconnect_calls: AtomicUsize::new(0),
                max_inbound_size: AtomicUsize::new(0),
                ack_mode: Mutex::new(AckMode::AckAll),
                dropped: Mutex::new(HashSet::new()),
            }
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_ack_mode(&self, mode: AckMode) {
            *self.ack_mode.lock().unwrap() = mode;
        }

        pub fn set_max_inbound_size(&self, size: usize) {
            self.max_inbound_size.store(size, Ordering::Release);
        }

        /// 测试注入入站事件（握手 / 下行 / 错误）
        pub fn emit(&self, event: TransportEvent) {
            let _ = self.events.send(event);
        }

        pub fn uplink_count(&self) -> usize {
            self.sent_uplinks.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RpcTransport for MockTransport {
        async fn connect(&self, _routing_key: &str, _routing_secret: &str) -> Result<()> {
            self.connect_calls.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }

        async fn disconnect(&self, _graceful: bool) -> Result<()> {
            self.disconnect_calls.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }

        async fn send_uplink(&self, msg: UplinkMsg) -> Result<()> {
            let msg_id = msg.uplink_msg_id;
            self.sent_uplinks.lock().unwrap().push(msg);
            let mode = self.ack_mode.lock().unwrap().clone();
            match mode {
                AckMode::AckAll => self.emit(TransportEvent::UplinkAck(UplinkResponseMsg {
                    uplink_msg_id: msg_id,
                    success: true,
                    error_msg: None,
                })),
                AckMode::AckNone => {}
                AckMode::DropOnce(ids) => {
                    let first_time = ids.contains(&msg_id)
                        && self.dropped.lock().unwrap().insert(msg_id);
                    if !first_time {
                        self.emit(TransportEvent::UplinkAck(UplinkResponseMsg {
                            uplink_msg_id: msg_id,
                            success: true,
                            error_msg: None,
                        }));
                    }
                }
                AckMode::NackAll => self.emit(TransportEvent::UplinkAck(UplinkResponseMsg {
                    uplink_msg_id: msg_id,
                    success: false,
                    error_msg: Some("server rejected".into()),
                })),
            }
            Ok(())
        }

        async fn send_downlink_response(&self, msg: DownlinkResponseMsg) -> Result<()> {
            self.downlink_responses.lock().unwrap().push(msg);
            Ok(())
        }

        async fn send_sync_request(&self, full_sync: bool, reset_sync: bool) -> Result<()> {
            self.sync_requests.lock().unwrap().push((full_sync, reset_sync));
            Ok(())
        }

        fn server_max_inbound_size(&self) -> usize {
            self.max_inbound_size.load(Ordering::Acquire)
        }

        fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
            self.events.subscribe()
        }
    }
}

#[cfg(test)]
pub use test_helpers::{AckMode, MockTransport};
