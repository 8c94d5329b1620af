//! 存储层 - 事件日志与属性存储的接口定义
//!
//! 本模块只定义能力边界（trait）与实体类型；`sqlite` 子模块提供
//! 默认的 rusqlite 实现。宿主平台可以注入自己的实现。

pub mod sqlite;

use crate::error::Result;
use async_trait::async_trait;
use edgelink_proto::{ActionType, EdgeConfiguration, EntityType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 属性写入的 server 作用域（云端约定的 scope 名）
pub const SERVER_SCOPE: &str = "SERVER_SCOPE";

/// 事件日志条目
///
/// `uuid` 为 v7（时间有序），其时间戳在游标推进时成为新的 start_ts；
/// `seq_id` 单调递增，日志翻转（cycle）时从 1 重新开始。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub uuid: Uuid,
    pub seq_id: i64,
    pub tenant_id: Uuid,
    pub entity_type: EntityType,
    pub action: ActionType,
    pub entity_id: Option<Uuid>,
    pub body: Option<serde_json::Value>,
    /// 入库时间（ms）
    pub created_ts: i64,
}

impl EventLogEntry {
    /// 从 v7 uuid 提取 Unix 毫秒时间戳
    pub fn uuid_timestamp_ms(&self) -> Option<i64> {
        self.uuid.get_timestamp().map(|ts| {
            let (secs, nanos) = ts.to_unix();
            secs as i64 * 1000 + (nanos / 1_000_000) as i64
        })
    }
}

/// 事件日志的一页
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub items: Vec<EventLogEntry>,
    pub has_next: bool,
}

/// 读取事件时的时间窗口（ms，闭区间）
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub start_ts: i64,
    pub end_ts: i64,
}

/// 属性值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Long(i64),
    Bool(bool),
}

/// 一条待写入的属性
#[derive(Debug, Clone)]
pub struct AttributeKvEntry {
    pub key: String,
    pub value: AttributeValue,
    pub last_update_ts: i64,
}

/// 边缘设置（按租户持久化，握手时重写）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSettings {
    pub edge_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub edge_type: String,
    pub routing_key: String,
    pub full_sync_required: bool,
}

impl EdgeSettings {
    /// 由握手配置构造新设置；新边缘总是要求一次全量同步
    pub fn from_configuration(configuration: &EdgeConfiguration) -> Self {
        Self {
            edge_id: configuration.edge_id,
            tenant_id: configuration.tenant_id,
            name: configuration.name.clone(),
            edge_type: configuration.edge_type.clone(),
            routing_key: configuration.routing_key.clone(),
            full_sync_required: true,
        }
    }
}

/// 属性存储（游标等长整型属性的读写）
#[async_trait]
pub trait AttributeStore: Send + Sync {
    async fn find_long(&self, tenant_id: Uuid, scope: &str, key: &str) -> Result<Option<i64>>;

    /// 批量写入，所有条目带调用方时钟的时间戳
    async fn save(
        &self,
        tenant_id: Uuid,
        scope: &str,
        entries: Vec<AttributeKvEntry>,
    ) -> Result<()>;
}

/// 属性通知器（连通性上报走这里，区别于游标的裸属性写入）
#[async_trait]
pub trait AttributeNotifier: Send + Sync {
    async fn save_attribute(
        &self,
        tenant_id: Uuid,
        scope: &str,
        key: &str,
        value: AttributeValue,
    ) -> Result<()>;
}

/// 事件日志存储
///
/// `find_events` 按 seq_id 升序分页：下界开区间（seq_id > seq_id_offset），
/// 可选上界闭区间，时间窗口过滤 created_ts。
#[async_trait]
pub trait EventLogStore: Send + Sync {
    async fn find_events(
        &self,
        tenant_id: Uuid,
        seq_id_offset: i64,
        seq_id_end: Option<i64>,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<EventPage>;

    async fn save_event(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        action: ActionType,
        entity_id: Option<Uuid>,
        body: Option<serde_json::Value>,
        ts: i64,
    ) -> Result<()>;

    async fn find_edge_settings(&self, tenant_id: Uuid) -> Result<Option<EdgeSettings>>;

    async fn save_edge_settings(&self, tenant_id: Uuid, settings: &EdgeSettings) -> Result<()>;
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// 测试用：内存事件日志，seq_id 可显式指定（便于模拟翻转）
    #[derive(Debug, Default)]
    pub struct InMemoryEventStore {
        pub events: Mutex<Vec<EventLogEntry>>,
        pub settings: Mutex<HashMap<Uuid, EdgeSettings>>,
    }

    impl InMemoryEventStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// 以显式 seq_id 压入一条事件
        pub fn push_event(
            &self,
            tenant_id: Uuid,
            seq_id: i64,
            entity_type: EntityType,
            action: ActionType,
        ) -> EventLogEntry {
            let entry = EventLogEntry {
                uuid: Uuid::now_v7(),
                seq_id,
                tenant_id,
                entity_type,
                action,
                entity_id: Some(Uuid::now_v7()),
                body: None,
                created_ts: chrono::Utc::now().timestamp_millis(),
            };
            self.events.lock().unwrap().push(entry.clone());
            entry
        }
    }

    #[async_trait]
    impl EventLogStore for InMemoryEventStore {
        async fn find_events(
            &self,
            tenant_id: Uuid,
            seq_id_offset: i64,
            seq_id_end: Option<i64>,
            window: &TimeWindow,
            limit: usize,
        ) -> Result<EventPage> {
            let mut items: Vec<EventLogEntry> = self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.tenant_id == tenant_id)
                .filter(|e| e.seq_id > seq_id_offset)
                .filter(|e| seq_id_end.map_or(true, |end| e.seq_id <= end))
                .filter(|e| e.created_ts >= window.start_ts && e.created_ts <= window.end_ts)
                .cloned()
                .collect();
            items.sort_by_key(|e| e.seq_id);
            let has_next = items.len() > limit;
            items.truncate(limit);
            Ok(EventPage { items, has_next })
        }

        async fn save_event(
            &self,
            tenant_id: Uuid,
            entity_type: EntityType,
            action: ActionType,
            entity_id: Option<Uuid>,
            body: Option<serde_json::Value>,
            ts: i64,
        ) -> Result<()> {
            let mut events = self.events.lock().unwrap();
            let next_seq = events.iter().map(|e| e.seq_id).max().unwrap_or(0) + 1;
            events.push(EventLogEntry {
                uuid: Uuid::now_v7(),
                seq_id: next_seq,
                tenant_id,
                entity_type,
                action,
                entity_id,
                body,
                created_ts: ts,
            });
            Ok(())
        }

        async fn find_edge_settings(&self, tenant_id: Uuid) -> Result<Option<EdgeSettings>> {
            Ok(self.settings.lock().unwrap().get(&tenant_id).cloned())
        }

        async fn save_edge_settings(&self, tenant_id: Uuid, settings: &EdgeSettings) -> Result<()> {
            self.settings
                .lock()
                .unwrap()
                .insert(tenant_id, settings.clone());
            Ok(())
        }
    }

    /// 测试用：内存属性存储，同时充当通知器
    #[derive(Debug, Default)]
    pub struct InMemoryAttributeStore {
        pub values: Mutex<HashMap<(Uuid, String, String), AttributeValue>>,
    }

    impl InMemoryAttributeStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get(&self, tenant_id: Uuid, scope: &str, key: &str) -> Option<AttributeValue> {
            self.values
                .lock()
                .unwrap()
                .get(&(tenant_id, scope.to_string(), key.to_string()))
                .cloned()
        }
    }

    #[async_trait]
    impl AttributeStore for InMemoryAttributeStore {
        async fn find_long(&self, tenant_id: Uuid, scope: &str, key: &str) -> Result<Option<i64>> {
            Ok(match self.get(tenant_id, scope, key) {
                Some(AttributeValue::Long(v)) => Some(v),
                _ => None,
            })
        }

        async fn save(
            &self,
            tenant_id: Uuid,
            scope: &str,
            entries: Vec<AttributeKvEntry>,
        ) -> Result<()> {
            let mut values = self.values.lock().unwrap();
            for entry in entries {
                values.insert(
                    (tenant_id, scope.to_string(), entry.key.clone()),
                    entry.value,
                );
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AttributeNotifier for InMemoryAttributeStore {
        async fn save_attribute(
            &self,
            tenant_id: Uuid,
            scope: &str,
            key: &str,
            value: AttributeValue,
        ) -> Result<()> {
            self.values
                .lock()
                .unwrap()
                .insert((tenant_id, scope.to_string(), key.to_string()), value);
            Ok(())
        }
    }
}

#[cfg(test)]
pub use test_helpers::{InMemoryAttributeStore, InMemoryEventStore};
