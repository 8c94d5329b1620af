//! 同步游标存储
//!
//! 游标 = (start_ts, seq_id_offset)，持久化在租户属性的两个约定 key 下。
//! 缺失的 key 按 0 处理；写入带调用方时钟，失败只记日志不传播。

use crate::error::{EdgeLinkError, Result};
use crate::state::SharedState;
use crate::storage::{AttributeKvEntry, AttributeStore, AttributeValue, SERVER_SCOPE};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

pub const QUEUE_START_TS_KEY: &str = "queueStartTs";
pub const QUEUE_SEQ_ID_OFFSET_KEY: &str = "queueSeqIdOffset";

/// 下一条待发事件的水位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCursor {
    pub start_ts: i64,
    pub seq_id_offset: i64,
}

/// 游标的读写
pub struct QueueCursorStore {
    attributes: Arc<dyn AttributeStore>,
    state: Arc<SharedState>,
}

impl QueueCursorStore {
    pub fn new(attributes: Arc<dyn AttributeStore>, state: Arc<SharedState>) -> Self {
        Self { attributes, state }
    }

    fn tenant_id(&self) -> Result<Uuid> {
        self.state
            .tenant_id()
            .ok_or_else(|| EdgeLinkError::NotInitialized("tenant id 未知，无法读写游标".into()))
    }

    /// 读取游标，缺失的 key 默认为 0
    pub async fn load(&self) -> Result<QueueCursor> {
        let tenant_id = self.tenant_id()?;
        let start_ts = self
            .attributes
            .find_long(tenant_id, SERVER_SCOPE, QUEUE_START_TS_KEY)
            .await?
            .unwrap_or(0);
        let seq_id_offset = self
            .attributes
            .find_long(tenant_id, SERVER_SCOPE, QUEUE_SEQ_ID_OFFSET_KEY)
            .await?
            .unwrap_or(0);
        Ok(QueueCursor {
            start_ts,
            seq_id_offset,
        })
    }

    /// 写入游标。fire-and-forget：失败记 warn，不向循环传播
    pub async fn store(&self, cursor: QueueCursor) {
        trace!(
            "updateQueueStartTsSeqIdOffset [{}][{}]",
            cursor.start_ts,
            cursor.seq_id_offset
        );
        let tenant_id = match self.tenant_id() {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to update queue offset: {}", e);
                return;
            }
        };
        let now = Utc::now().timestamp_millis();
        let entries = vec![
            AttributeKvEntry {
                key: QUEUE_START_TS_KEY.to_string(),
                value: AttributeValue::Long(cursor.start_ts),
                last_update_ts: now,
            },
            AttributeKvEntry {
                key: QUEUE_SEQ_ID_OFFSET_KEY.to_string(),
                value: AttributeValue::Long(cursor.seq_id_offset),
                last_update_ts: now,
            },
        ];
        match self.attributes.save(tenant_id, SERVER_SCOPE, entries).await {
            Ok(()) => debug!(
                "Queue offset was updated [{}][{}]",
                cursor.start_ts, cursor.seq_id_offset
            ),
            Err(e) => warn!("Failed to update queue offset: {}", e),
        }
    }
}
