//! 下行消息处理 - 回执、同步完成检测与补发同步请求
//!
//! 回执按处理完成的先后发出，可能与到达顺序不同；下行消费方需幂等。

use crate::error::{flatten_cause, Result};
use crate::events::{EventManager, SdkEvent};
use crate::state::SharedState;
use crate::storage::EdgeSettings;
use crate::transport::RpcTransport;
use async_trait::async_trait;
use edgelink_proto::{DownlinkMsg, DownlinkResponseMsg};
use std::sync::Arc;
use tracing::{error, info, trace, warn};
use uuid::Uuid;

/// 下行处理上下文（握手后生效的只读快照）
#[derive(Debug, Clone)]
pub struct DownlinkContext {
    pub tenant_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub edge_settings: Option<EdgeSettings>,
    pub queue_start_ts: i64,
}

/// 下行业务处理器（外部协作方：把载荷落到本地领域模型）
#[async_trait]
pub trait DownlinkProcessor: Send + Sync {
    async fn process_downlink(&self, context: DownlinkContext, msg: &DownlinkMsg) -> Result<()>;
}

/// 空处理器：只认载荷不做事，宿主未注入时的缺省
pub struct NoopDownlinkProcessor;

#[async_trait]
impl DownlinkProcessor for NoopDownlinkProcessor {
    async fn process_downlink(&self, _context: DownlinkContext, _msg: &DownlinkMsg) -> Result<()> {
        Ok(())
    }
}

/// 下行消息处理器
pub struct DownlinkHandler {
    transport: Arc<dyn RpcTransport>,
    state: Arc<SharedState>,
    processor: Arc<dyn DownlinkProcessor>,
    events: Arc<EventManager>,
    routing_key: String,
}

impl DownlinkHandler {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        state: Arc<SharedState>,
        processor: Arc<dyn DownlinkProcessor>,
        events: Arc<EventManager>,
        routing_key: String,
    ) -> Self {
        Self {
            transport,
            state,
            processor,
            events,
            routing_key,
        }
    }

    /// 处理一条下行消息并回执
    pub async fn process(&self, msg: DownlinkMsg) {
        let edge_customer_id_updated = match &msg.edge_configuration {
            Some(configuration) => self.state.set_or_update_customer(configuration),
            None => false,
        };

        if self.state.sync_in_progress() && msg.sync_completed {
            self.state.set_sync_in_progress(false);
            self.events.emit(SdkEvent::SyncCompleted);
        }

        let context = DownlinkContext {
            tenant_id: self.state.tenant_id(),
            customer_id: self.state.customer_id(),
            edge_settings: self.state.edge_settings(),
            queue_start_ts: self.state.queue_start_ts(),
        };

        match self.processor.process_downlink(context, &msg).await {
            Ok(()) => {
                trace!(
                    "[{}] DownlinkMsg has been processed successfully! DownlinkMsgId {}",
                    self.routing_key,
                    msg.downlink_msg_id
                );
                self.respond(DownlinkResponseMsg {
                    downlink_msg_id: msg.downlink_msg_id,
                    success: true,
                    error_msg: None,
                })
                .await;
                if msg.edge_configuration.is_some()
                    && edge_customer_id_updated
                    && !self.state.sync_in_progress()
                {
                    info!("Edge customer id has been updated. Sending sync request...");
                    match self.transport.send_sync_request(true, false).await {
                        Ok(()) => self.state.set_sync_in_progress(true),
                        Err(e) => warn!("Failed to send sync request: {}", e),
                    }
                }
            }
            Err(e) => {
                error!(
                    "[{}] Failed to process DownlinkMsg! DownlinkMsgId {}",
                    self.routing_key, msg.downlink_msg_id
                );
                self.respond(DownlinkResponseMsg {
                    downlink_msg_id: msg.downlink_msg_id,
                    success: false,
                    error_msg: Some(flatten_cause(&e)),
                })
                .await;
            }
        }
    }

    async fn respond(&self, response: DownlinkResponseMsg) {
        if let Err(e) = self.transport.send_downlink_response(response).await {
            warn!("Failed to send downlink response: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EdgeLinkError;
    use crate::transport::MockTransport;
    use edgelink_proto::EdgeConfiguration;

    struct FailingProcessor;

    #[async_trait]
    impl DownlinkProcessor for FailingProcessor {
        async fn process_downlink(
            &self,
            _context: DownlinkContext,
            _msg: &DownlinkMsg,
        ) -> Result<()> {
            Err(EdgeLinkError::InvalidData("bad payload".into()))
        }
    }

    fn downlink(id: i32) -> DownlinkMsg {
        DownlinkMsg {
            downlink_msg_id: id,
            edge_configuration: None,
            sync_completed: false,
            payloads: vec![],
        }
    }

    fn configuration(customer_id: Option<Uuid>) -> EdgeConfiguration {
        EdgeConfiguration {
            tenant_id: Uuid::now_v7(),
            edge_id: Uuid::now_v7(),
            customer_id,
            name: "edge".into(),
            edge_type: "default".into(),
            routing_key: "rk".into(),
            cloud_type: "CE".into(),
        }
    }

    fn handler_with(
        processor: Arc<dyn DownlinkProcessor>,
    ) -> (DownlinkHandler, Arc<MockTransport>, Arc<SharedState>) {
        let transport = Arc::new(MockTransport::new());
        let state = Arc::new(SharedState::new());
        let handler = DownlinkHandler::new(
            transport.clone(),
            state.clone(),
            processor,
            Arc::new(EventManager::default()),
            "rk".into(),
        );
        (handler, transport, state)
    }

    #[tokio::test]
    async fn success_emits_positive_response() {
        let (handler, transport, _) = handler_with(Arc::new(NoopDownlinkProcessor));
        handler.process(downlink(7)).await;
        let responses = transport.downlink_responses.lock().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].downlink_msg_id, 7);
        assert!(responses[0].success);
    }

    #[tokio::test]
    async fn failure_emits_negative_response_with_cause() {
        let (handler, transport, _) = handler_with(Arc::new(FailingProcessor));
        handler.process(downlink(8)).await;
        let responses = transport.downlink_responses.lock().unwrap();
        assert!(!responses[0].success);
        assert!(responses[0].error_msg.as_ref().unwrap().contains("Invalid data"));
    }

    #[tokio::test]
    async fn sync_completed_clears_flag() {
        let (handler, _, state) = handler_with(Arc::new(NoopDownlinkProcessor));
        state.set_sync_in_progress(true);
        let mut msg = downlink(1);
        msg.sync_completed = true;
        handler.process(msg).await;
        assert!(!state.sync_in_progress());
    }

    #[tokio::test]
    async fn customer_update_triggers_follow_up_sync() {
        let (handler, transport, state) = handler_with(Arc::new(NoopDownlinkProcessor));
        let mut msg = downlink(2);
        msg.edge_configuration = Some(configuration(Some(Uuid::now_v7())));
        handler.process(msg).await;
        // 客户变更 + 不在同步中 → 发出全量同步请求并置位
        assert_eq!(*transport.sync_requests.lock().unwrap(), vec![(true, false)]);
        assert!(state.sync_in_progress());
    }

    #[tokio::test]
    async fn sync_in_progress_suppresses_follow_up_requests() {
        let (handler, transport, state) = handler_with(Arc::new(NoopDownlinkProcessor));
        state.set_sync_in_progress(true);
        let mut msg = downlink(3);
        msg.edge_configuration = Some(configuration(Some(Uuid::now_v7())));
        handler.process(msg).await;
        // 正在同步时不再追加同步请求（即便客户变更）
        assert!(transport.sync_requests.lock().unwrap().is_empty());
    }
}
