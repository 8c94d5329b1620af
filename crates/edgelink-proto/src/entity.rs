//! 事件类型枚举 - 边缘事件日志的受控枚举
//!
//! entity_type / action 为受控枚举，新增需 SDK 与云端同步升级。

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 事件所属实体类型（与云端 edge 协议一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Device,
    Asset,
    Dashboard,
    EntityView,
    Relation,
    Alarm,
    RuleChain,
    WidgetsBundle,
    Edge,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Device => "DEVICE",
            Self::Asset => "ASSET",
            Self::Dashboard => "DASHBOARD",
            Self::EntityView => "ENTITY_VIEW",
            Self::Relation => "RELATION",
            Self::Alarm => "ALARM",
            Self::RuleChain => "RULE_CHAIN",
            Self::WidgetsBundle => "WIDGETS_BUNDLE",
            Self::Edge => "EDGE",
        }
    }
}

impl FromStr for EntityType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEVICE" => Ok(Self::Device),
            "ASSET" => Ok(Self::Asset),
            "DASHBOARD" => Ok(Self::Dashboard),
            "ENTITY_VIEW" => Ok(Self::EntityView),
            "RELATION" => Ok(Self::Relation),
            "ALARM" => Ok(Self::Alarm),
            "RULE_CHAIN" => Ok(Self::RuleChain),
            "WIDGETS_BUNDLE" => Ok(Self::WidgetsBundle),
            "EDGE" => Ok(Self::Edge),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 事件动作类型
///
/// 分两族：实体生命周期动作按 entity_type 路由；遥测/属性与 *_REQUEST
/// 动作直接按 action 路由（见 SDK 侧 TranslatorRegistry）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Added,
    Updated,
    Deleted,
    AlarmAck,
    AlarmClear,
    CredentialsUpdated,
    RelationAddOrUpdate,
    RelationDeleted,
    AssignedToCustomer,
    UnassignedFromCustomer,
    AttributesUpdated,
    PostAttributes,
    AttributesDeleted,
    TimeseriesUpdated,
    AttributesRequest,
    RelationRequest,
    RuleChainMetadataRequest,
    CredentialsRequest,
    RpcCall,
    WidgetBundleTypesRequest,
    EntityViewRequest,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "ADDED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
            Self::AlarmAck => "ALARM_ACK",
            Self::AlarmClear => "ALARM_CLEAR",
            Self::CredentialsUpdated => "CREDENTIALS_UPDATED",
            Self::RelationAddOrUpdate => "RELATION_ADD_OR_UPDATE",
            Self::RelationDeleted => "RELATION_DELETED",
            Self::AssignedToCustomer => "ASSIGNED_TO_CUSTOMER",
            Self::UnassignedFromCustomer => "UNASSIGNED_FROM_CUSTOMER",
            Self::AttributesUpdated => "ATTRIBUTES_UPDATED",
            Self::PostAttributes => "POST_ATTRIBUTES",
            Self::AttributesDeleted => "ATTRIBUTES_DELETED",
            Self::TimeseriesUpdated => "TIMESERIES_UPDATED",
            Self::AttributesRequest => "ATTRIBUTES_REQUEST",
            Self::RelationRequest => "RELATION_REQUEST",
            Self::RuleChainMetadataRequest => "RULE_CHAIN_METADATA_REQUEST",
            Self::CredentialsRequest => "CREDENTIALS_REQUEST",
            Self::RpcCall => "RPC_CALL",
            Self::WidgetBundleTypesRequest => "WIDGET_BUNDLE_TYPES_REQUEST",
            Self::EntityViewRequest => "ENTITY_VIEW_REQUEST",
        }
    }
}

impl FromStr for ActionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADDED" => Ok(Self::Added),
            "UPDATED" => Ok(Self::Updated),
            "DELETED" => Ok(Self::Deleted),
            "ALARM_ACK" => Ok(Self::AlarmAck),
            "ALARM_CLEAR" => Ok(Self::AlarmClear),
            "CREDENTIALS_UPDATED" => Ok(Self::CredentialsUpdated),
            "RELATION_ADD_OR_UPDATE" => Ok(Self::RelationAddOrUpdate),
            "RELATION_DELETED" => Ok(Self::RelationDeleted),
            "ASSIGNED_TO_CUSTOMER" => Ok(Self::AssignedToCustomer),
            "UNASSIGNED_FROM_CUSTOMER" => Ok(Self::UnassignedFromCustomer),
            "ATTRIBUTES_UPDATED" => Ok(Self::AttributesUpdated),
            "POST_ATTRIBUTES" => Ok(Self::PostAttributes),
            "ATTRIBUTES_DELETED" => Ok(Self::AttributesDeleted),
            "TIMESERIES_UPDATED" => Ok(Self::TimeseriesUpdated),
            "ATTRIBUTES_REQUEST" => Ok(Self::AttributesRequest),
            "RELATION_REQUEST" => Ok(Self::RelationRequest),
            "RULE_CHAIN_METADATA_REQUEST" => Ok(Self::RuleChainMetadataRequest),
            "CREDENTIALS_REQUEST" => Ok(Self::CredentialsRequest),
            "RPC_CALL" => Ok(Self::RpcCall),
            "WIDGET_BUNDLE_TYPES_REQUEST" => Ok(Self::WidgetBundleTypesRequest),
            "ENTITY_VIEW_REQUEST" => Ok(Self::EntityViewRequest),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
