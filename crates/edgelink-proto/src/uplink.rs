//! 上行消息（边缘 → 云端）
//!
//! `uplink_msg_id` 在一个批次内唯一，是 ack 关联的 key。
//! 传输层以 JSON 承载，`serialized_size` 即 JSON 字节数，
//! 用于与服务端协商的 max inbound size 比较。

use crate::entity::{ActionType, EntityType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 上行消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkMsg {
    /// 批次内唯一的消息 ID，ack 按它回执
    pub uplink_msg_id: i32,
    /// 载荷列表（一条事件通常对应一个载荷）
    pub payloads: Vec<UplinkPayload>,
}

impl UplinkMsg {
    pub fn new(uplink_msg_id: i32, payload: UplinkPayload) -> Self {
        Self {
            uplink_msg_id,
            payloads: vec![payload],
        }
    }

    /// 序列化后的字节数（JSON 编码）
    pub fn serialized_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// 上行载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UplinkPayload {
    /// 实体生命周期事件（设备/资产/仪表板/实体视图/关系/告警）
    EntityUpdate {
        entity_type: EntityType,
        action: ActionType,
        entity_id: Option<Uuid>,
        body: Option<serde_json::Value>,
    },
    /// 遥测 / 属性变更
    TelemetryUpdate {
        action: ActionType,
        entity_id: Option<Uuid>,
        body: Option<serde_json::Value>,
    },
    /// 请求云端下发属性
    AttributesRequest {
        entity_type: EntityType,
        entity_id: Uuid,
    },
    /// 请求云端下发关系
    RelationRequest {
        entity_type: EntityType,
        entity_id: Uuid,
    },
    /// 请求规则链元数据
    RuleChainMetadataRequest { entity_id: Uuid },
    /// 请求实体凭证
    CredentialsRequest { entity_id: Uuid },
    /// RPC 调用透传
    RpcCall {
        entity_id: Option<Uuid>,
        body: Option<serde_json::Value>,
    },
    /// 请求组件包类型
    WidgetBundleTypesRequest { entity_id: Uuid },
    /// 请求实体视图
    EntityViewsRequest { entity_id: Uuid },
}

/// 上行回执（云端 → 边缘，对某条 UplinkMsg 的确认）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkResponseMsg {
    pub uplink_msg_id: i32,
    pub success: bool,
    pub error_msg: Option<String>,
}
