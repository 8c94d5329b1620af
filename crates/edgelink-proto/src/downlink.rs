//! 下行消息（云端 → 边缘）与握手配置

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 下行消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownlinkMsg {
    pub downlink_msg_id: i32,
    /// 握手 / 配置变更时携带
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_configuration: Option<EdgeConfiguration>,
    /// 全量同步完成标记
    #[serde(default)]
    pub sync_completed: bool,
    /// 具体业务载荷，由下行处理器解释
    #[serde(default)]
    pub payloads: Vec<serde_json::Value>,
}

/// 对某条 DownlinkMsg 的回执（边缘 → 云端）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownlinkResponseMsg {
    pub downlink_msg_id: i32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

/// 握手载荷：云端下发的边缘配置
///
/// `cloud_type` 必须为 "CE"，否则本 SDK 会请求进程退出（见 SessionController）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfiguration {
    pub tenant_id: Uuid,
    pub edge_id: Uuid,
    /// 空 UUID 视同未分配客户
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<Uuid>,
    pub name: String,
    pub edge_type: String,
    pub routing_key: String,
    pub cloud_type: String,
}

impl EdgeConfiguration {
    /// 归一化的 customer_id：空 UUID 等同于 None
    pub fn customer_id(&self) -> Option<Uuid> {
        self.customer_id.filter(|id| !id.is_nil())
    }
}
