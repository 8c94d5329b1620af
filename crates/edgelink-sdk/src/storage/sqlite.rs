//! SQLite 存储实现 - 事件日志 / 属性 / 边缘设置
//!
//! 事件日志表的 seq_id 用 AUTOINCREMENT 保证单调递增；
//! 属性表按 (tenant, scope, key) 主键幂等覆盖。

use crate::error::{EdgeLinkError, Result};
use crate::storage::{
    AttributeKvEntry, AttributeNotifier, AttributeStore, AttributeValue, EdgeSettings,
    EventLogEntry, EventLogStore, EventPage, TimeWindow,
};
use async_trait::async_trait;
use chrono::Utc;
use edgelink_proto::{ActionType, EntityType};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// 基于 rusqlite 的默认存储
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件并建表
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EdgeLinkError::IO(format!("创建存储目录失败: {}", e)))?;
        }
        let conn = Connection::open(path)?;
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 内存库，测试用
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_tables(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS event_log (
                seq_id INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_id TEXT,
                body TEXT,
                created_ts INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_event_log_tenant_ts
                ON event_log (tenant_id, created_ts);
            CREATE TABLE IF NOT EXISTS attribute_kv (
                tenant_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                key TEXT NOT NULL,
                long_value INTEGER,
                bool_value INTEGER,
                last_update_ts INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, scope, key)
            );
            CREATE TABLE IF NOT EXISTS edge_settings (
                tenant_id TEXT PRIMARY KEY,
                settings TEXT NOT NULL,
                updated_ts INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    fn map_event_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, String, String, Option<String>, Option<String>, i64)>
    {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn build_entry(
        raw: (i64, String, String, String, String, Option<String>, Option<String>, i64),
    ) -> Result<EventLogEntry> {
        let (seq_id, uuid, tenant_id, entity_type, action, entity_id, body, created_ts) = raw;
        Ok(EventLogEntry {
            uuid: Uuid::parse_str(&uuid)
                .map_err(|e| EdgeLinkError::InvalidData(format!("事件 uuid 非法: {}", e)))?,
            seq_id,
            tenant_id: Uuid::parse_str(&tenant_id)
                .map_err(|e| EdgeLinkError::InvalidData(format!("tenant_id 非法: {}", e)))?,
            entity_type: EntityType::from_str(&entity_type).map_err(|_| {
                EdgeLinkError::InvalidData(format!("未知 entity_type: {}", entity_type))
            })?,
            action: ActionType::from_str(&action)
                .map_err(|_| EdgeLinkError::InvalidData(format!("未知 action: {}", action)))?,
            entity_id: entity_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| EdgeLinkError::InvalidData(format!("entity_id 非法: {}", e)))?,
            body: body.map(|s| serde_json::from_str(&s)).transpose()?,
            created_ts,
        })
    }
}

#[async_trait]
impl EventLogStore for SqliteStore {
    async fn find_events(
        &self,
        tenant_id: Uuid,
        seq_id_offset: i64,
        seq_id_end: Option<i64>,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<EventPage> {
        let conn = self.conn.lock().await;
        // limit+1 探测是否还有下一页
        let sql = "SELECT seq_id, uuid, tenant_id, entity_type, action, entity_id, body, created_ts
             FROM event_log
             WHERE tenant_id = ?1 AND seq_id > ?2 AND seq_id <= ?3
               AND created_ts >= ?4 AND created_ts <= ?5
             ORDER BY seq_id ASC
             LIMIT ?6";
        let mut stmt = conn.prepare(sql)?;
        let seq_end = seq_id_end.unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![
                tenant_id.to_string(),
                seq_id_offset,
                seq_end,
                window.start_ts,
                window.end_ts,
                (limit + 1) as i64
            ],
            Self::map_event_row,
        )?;

        let mut items = Vec::new();
        for raw in rows {
            items.push(Self::build_entry(raw?)?);
        }
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
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO event_log (uuid, tenant_id, entity_type, action, entity_id, body, created_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Uuid::now_v7().to_string(),
                tenant_id.to_string(),
                entity_type.as_str(),
                action.as_str(),
                entity_id.map(|id| id.to_string()),
                body.map(|b| b.to_string()),
                ts
            ],
        )?;
        Ok(())
    }

    async fn find_edge_settings(&self, tenant_id: Uuid) -> Result<Option<EdgeSettings>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT settings FROM edge_settings WHERE tenant_id = ?1")?;
        let mut rows = stmt.query(params![tenant_id.to_string()])?;
        match rows.next()? {
            Some(row) => {
                let raw: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn save_edge_settings(&self, tenant_id: Uuid, settings: &EdgeSettings) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO edge_settings (tenant_id, settings, updated_ts)
             VALUES (?1, ?2, ?3)",
            params![
                tenant_id.to_string(),
                serde_json::to_string(settings)?,
                Utc::now().timestamp_millis()
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl AttributeStore for SqliteStore {
    async fn find_long(&self, tenant_id: Uuid, scope: &str, key: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT long_value FROM attribute_kv
             WHERE tenant_id = ?1 AND scope = ?2 AND key = ?3",
        )?;
        let mut rows = stmt.query(params![tenant_id.to_string(), scope, key])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        tenant_id: Uuid,
        scope: &str,
        entries: Vec<AttributeKvEntry>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        for entry in entries {
            let (long_value, bool_value) = match entry.value {
                AttributeValue::Long(v) => (Some(v), None),
                AttributeValue::Bool(v) => (None, Some(v as i64)),
            };
            conn.execute(
                "INSERT OR REPLACE INTO attribute_kv
                     (tenant_id, scope, key, long_value, bool_value, last_update_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    tenant_id.to_string(),
                    scope,
                    entry.key,
                    long_value,
                    bool_value,
                    entry.last_update_ts
                ],
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl AttributeNotifier for SqliteStore {
    async fn save_attribute(
        &self,
        tenant_id: Uuid,
        scope: &str,
        key: &str,
        value: AttributeValue,
    ) -> Result<()> {
        self.save(
            tenant_id,
            scope,
            vec![AttributeKvEntry {
                key: key.to_string(),
                value,
                last_update_ts: Utc::now().timestamp_millis(),
            }],
        )
        .await
    }
}
