//! 事件日志读取 - 活性探测与翻转处理
//!
//! 读取顺序：先做一次不带 seq 下界的活性探测，确认窗口内确有新事件
//! （seq_id > offset，或 seq_id == 1 说明日志编号重启）；再按
//! [seq_id_offset, ∞) 正常翻页。正常页为空而探测为真时按翻转处理，
//! 改读 [0, max_read_records_count] —— 这是 seq 分量唯一允许回退的场合。

use crate::error::{EdgeLinkError, Result};
use crate::state::SharedState;
use crate::storage::{EventLogStore, EventPage, TimeWindow};
use chrono::Utc;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

pub struct EventLogReader {
    store: Arc<dyn EventLogStore>,
    state: Arc<SharedState>,
    max_read_records_count: usize,
}

impl EventLogReader {
    pub fn new(
        store: Arc<dyn EventLogStore>,
        state: Arc<SharedState>,
        max_read_records_count: usize,
    ) -> Self {
        Self {
            store,
            state,
            max_read_records_count,
        }
    }

    fn tenant_id(&self) -> Result<Uuid> {
        self.state
            .tenant_id()
            .ok_or_else(|| EdgeLinkError::NotInitialized("tenant id 未知，无法读事件日志".into()))
    }

    /// 当前读取窗口：[queue_start_ts, now]
    pub fn current_window(&self, start_ts: i64) -> TimeWindow {
        TimeWindow {
            start_ts,
            end_ts: Utc::now().timestamp_millis(),
        }
    }

    /// 活性探测：窗口内是否有新事件
    ///
    /// 不带 seq 下界读一页；命中任一 seq_id > offset 或 seq_id == 1
    /// （日志编号重启）即判定有活。
    pub async fn new_events_available(
        &self,
        seq_id_offset: i64,
        window: &TimeWindow,
    ) -> Result<bool> {
        let tenant_id = self.tenant_id()?;
        let page = self
            .store
            .find_events(tenant_id, 0, None, window, self.max_read_records_count)
            .await?;
        Ok(page
            .items
            .iter()
            .any(|e| e.seq_id > seq_id_offset || e.seq_id == 1))
    }

    /// 正常翻页：seq_id > seq_id_offset，窗口过滤，升序
    pub async fn read_page(&self, seq_id_offset: i64, window: &TimeWindow) -> Result<EventPage> {
        let tenant_id = self.tenant_id()?;
        trace!("reading event page, seq_id_offset={}", seq_id_offset);
        self.store
            .find_events(
                tenant_id,
                seq_id_offset,
                None,
                window,
                self.max_read_records_count,
            )
            .await
    }

    /// 翻转读：日志编号已重启，从 [0, max_read_records_count] 重读
    pub async fn read_wrap_page(&self, window: &TimeWindow) -> Result<EventPage> {
        let tenant_id = self.tenant_id()?;
        self.store
            .find_events(
                tenant_id,
                0,
                Some(self.max_read_records_count as i64),
                window,
                self.max_read_records_count,
            )
            .await
    }
}
