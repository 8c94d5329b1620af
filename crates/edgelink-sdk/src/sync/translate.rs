//! 事件翻译 - 事件日志条目到上行消息的分发与转换
//!
//! 动作分两族：
//! - 实体生命周期动作按 entity_type 路由到各领域翻译器；
//! - 遥测/属性与 *_REQUEST 动作直接按 action 路由。
//!
//! 单条翻译失败只丢那一条（记日志），批次继续；不支持的组合返回 None。

use crate::error::{EdgeLinkError, Result};
use crate::storage::EventLogEntry;
use edgelink_proto::{ActionType, EntityType, UplinkMsg, UplinkPayload};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::{error, trace, warn};
use uuid::Uuid;

/// 上行消息 ID 发生器（批次内唯一，int32 正数回绕）
#[derive(Debug)]
pub struct UplinkMsgIdSeq(AtomicI32);

impl UplinkMsgIdSeq {
    pub fn new() -> Self {
        Self(AtomicI32::new(0))
    }

    pub fn next(&self) -> i32 {
        let mut id = self.0.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        if id <= 0 {
            // 回绕后重新从 1 开始
            self.0.store(1, Ordering::Release);
            id = 1;
        }
        id
    }
}

impl Default for UplinkMsgIdSeq {
    fn default() -> Self {
        Self::new()
    }
}

pub trait DeviceTranslator: Send + Sync {
    fn device_event_to_uplink(
        &self,
        tenant_id: Uuid,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>>;
    fn rpc_call_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>>;
}

pub trait AssetTranslator: Send + Sync {
    fn asset_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>>;
}

pub trait DashboardTranslator: Send + Sync {
    fn dashboard_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>>;
}

pub trait EntityViewTranslator: Send + Sync {
    fn entity_view_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>>;
    fn entity_view_request_event_to_uplink(
        &self,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>>;
}

pub trait RelationTranslator: Send + Sync {
    fn relation_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>>;
    fn relation_request_event_to_uplink(&self, event: &EventLogEntry)
        -> Result<Option<UplinkMsg>>;
}

pub trait AlarmTranslator: Send + Sync {
    fn alarm_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>>;
}

pub trait TelemetryTranslator: Send + Sync {
    fn telemetry_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>>;
    fn attributes_request_event_to_uplink(
        &self,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>>;
}

pub trait RuleChainTranslator: Send + Sync {
    fn rule_chain_metadata_request_event_to_uplink(
        &self,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>>;
}

pub trait EntityTranslator: Send + Sync {
    fn credentials_request_event_to_uplink(
        &self,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>>;
}

pub trait WidgetBundleTranslator: Send + Sync {
    fn widget_bundle_types_request_event_to_uplink(
        &self,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>>;
}

/// 翻译器注册表：按 (entity_type, action) 分发
pub struct TranslatorRegistry {
    device: Arc<dyn DeviceTranslator>,
    asset: Arc<dyn AssetTranslator>,
    dashboard: Arc<dyn DashboardTranslator>,
    entity_view: Arc<dyn EntityViewTranslator>,
    relation: Arc<dyn RelationTranslator>,
    alarm: Arc<dyn AlarmTranslator>,
    telemetry: Arc<dyn TelemetryTranslator>,
    rule_chain: Arc<dyn RuleChainTranslator>,
    entity: Arc<dyn EntityTranslator>,
    widget_bundle: Arc<dyn WidgetBundleTranslator>,
}

impl TranslatorRegistry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: Arc<dyn DeviceTranslator>,
        asset: Arc<dyn AssetTranslator>,
        dashboard: Arc<dyn DashboardTranslator>,
        entity_view: Arc<dyn EntityViewTranslator>,
        relation: Arc<dyn RelationTranslator>,
        alarm: Arc<dyn AlarmTranslator>,
        telemetry: Arc<dyn TelemetryTranslator>,
        rule_chain: Arc<dyn RuleChainTranslator>,
        entity: Arc<dyn EntityTranslator>,
        widget_bundle: Arc<dyn WidgetBundleTranslator>,
    ) -> Self {
        Self {
            device,
            asset,
            dashboard,
            entity_view,
            relation,
            alarm,
            telemetry,
            rule_chain,
            entity,
            widget_bundle,
        }
    }

    /// 全部用内置 JSON 翻译器
    pub fn with_json_defaults() -> Self {
        let json = Arc::new(JsonTranslators::new());
        Self::new(
            json.clone(),
            json.clone(),
            json.clone(),
            json.clone(),
            json.clone(),
            json.clone(),
            json.clone(),
            json.clone(),
            json.clone(),
            json,
        )
    }

    /// 翻译一页事件。单条失败或不支持只影响那一条。
    pub fn convert_all(&self, tenant_id: Uuid, events: &[EventLogEntry]) -> Vec<UplinkMsg> {
        let mut result = Vec::with_capacity(events.len());
        for event in events {
            trace!("Converting event [{:?}]", event.uuid);
            match self.convert(tenant_id, event) {
                Ok(Some(msg)) => result.push(msg),
                Ok(None) => {}
                Err(e) => {
                    error!(
                        "Exception during converting events from queue, skipping event [{}]: {}",
                        event.uuid, e
                    );
                }
            }
        }
        result
    }

    fn convert(&self, tenant_id: Uuid, event: &EventLogEntry) -> Result<Option<UplinkMsg>> {
        match event.action {
            ActionType::Updated
            | ActionType::Added
            | ActionType::Deleted
            | ActionType::AlarmAck
            | ActionType::AlarmClear
            | ActionType::CredentialsUpdated
            | ActionType::RelationAddOrUpdate
            | ActionType::RelationDeleted
            | ActionType::AssignedToCustomer
            | ActionType::UnassignedFromCustomer => self.convert_entity_event(tenant_id, event),
            ActionType::AttributesUpdated
            | ActionType::PostAttributes
            | ActionType::AttributesDeleted
            | ActionType::TimeseriesUpdated => self.telemetry.telemetry_event_to_uplink(event),
            ActionType::AttributesRequest => {
                self.telemetry.attributes_request_event_to_uplink(event)
            }
            ActionType::RelationRequest => self.relation.relation_request_event_to_uplink(event),
            ActionType::RuleChainMetadataRequest => self
                .rule_chain
                .rule_chain_metadata_request_event_to_uplink(event),
            ActionType::CredentialsRequest => {
                self.entity.credentials_request_event_to_uplink(event)
            }
            ActionType::RpcCall => self.device.rpc_call_event_to_uplink(event),
            ActionType::WidgetBundleTypesRequest => self
                .widget_bundle
                .widget_bundle_types_request_event_to_uplink(event),
            ActionType::EntityViewRequest => self
                .entity_view
                .entity_view_request_event_to_uplink(event),
        }
    }

    fn convert_entity_event(
        &self,
        tenant_id: Uuid,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>> {
        trace!(
            "Executing convert_entity_event, event [{}], action [{}]",
            event.uuid,
            event.action
        );
        match event.entity_type {
            EntityType::Device => self.device.device_event_to_uplink(tenant_id, event),
            EntityType::Alarm => self.alarm.alarm_event_to_uplink(event),
            EntityType::Asset => self.asset.asset_event_to_uplink(event),
            EntityType::Dashboard => self.dashboard.dashboard_event_to_uplink(event),
            EntityType::EntityView => self.entity_view.entity_view_event_to_uplink(event),
            EntityType::Relation => self.relation.relation_event_to_uplink(event),
            _ => {
                warn!("Unsupported event type [{}]", event.entity_type);
                Ok(None)
            }
        }
    }
}

/// 内置翻译器：把事件体按 JSON 原样打包进对应载荷
///
/// 生产环境按领域注入自己的实现即可；这里保证 SDK 开箱能跑通。
pub struct JsonTranslators {
    ids: UplinkMsgIdSeq,
}

impl JsonTranslators {
    pub fn new() -> Self {
        Self {
            ids: UplinkMsgIdSeq::new(),
        }
    }

    fn entity_update(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>> {
        Ok(Some(UplinkMsg::new(
            self.ids.next(),
            UplinkPayload::EntityUpdate {
                entity_type: event.entity_type,
                action: event.action,
                entity_id: event.entity_id,
                body: event.body.clone(),
            },
        )))
    }

    fn required_entity_id(&self, event: &EventLogEntry) -> Result<Uuid> {
        event.entity_id.ok_or_else(|| {
            EdgeLinkError::InvalidData(format!(
                "{} 事件缺少 entity_id，无法构造请求",
                event.action
            ))
        })
    }
}

impl Default for JsonTranslators {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTranslator for JsonTranslators {
    fn device_event_to_uplink(
        &self,
        _tenant_id: Uuid,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>> {
        self.entity_update(event)
    }

    fn rpc_call_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>> {
        Ok(Some(UplinkMsg::new(
            self.ids.next(),
            UplinkPayload::RpcCall {
                entity_id: event.entity_id,
                body: event.body.clone(),
            },
        )))
    }
}

impl AssetTranslator for JsonTranslators {
    fn asset_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>> {
        self.entity_update(event)
    }
}

impl DashboardTranslator for JsonTranslators {
    fn dashboard_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>> {
        self.entity_update(event)
    }
}

impl EntityViewTranslator for JsonTranslators {
    fn entity_view_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>> {
        self.entity_update(event)
    }

    fn entity_view_request_event_to_uplink(
        &self,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>> {
        let entity_id = self.required_entity_id(event)?;
        Ok(Some(UplinkMsg::new(
            self.ids.next(),
            UplinkPayload::EntityViewsRequest { entity_id },
        )))
    }
}

impl RelationTranslator for JsonTranslators {
    fn relation_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>> {
        self.entity_update(event)
    }

    fn relation_request_event_to_uplink(
        &self,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>> {
        let entity_id = self.required_entity_id(event)?;
        Ok(Some(UplinkMsg::new(
            self.ids.next(),
            UplinkPayload::RelationRequest {
                entity_type: event.entity_type,
                entity_id,
            },
        )))
    }
}

impl AlarmTranslator for JsonTranslators {
    fn alarm_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>> {
        self.entity_update(event)
    }
}

impl TelemetryTranslator for JsonTranslators {
    fn telemetry_event_to_uplink(&self, event: &EventLogEntry) -> Result<Option<UplinkMsg>> {
        Ok(Some(UplinkMsg::new(
            self.ids.next(),
            UplinkPayload::TelemetryUpdate {
                action: event.action,
                entity_id: event.entity_id,
                body: event.body.clone(),
            },
        )))
    }

    fn attributes_request_event_to_uplink(
        &self,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>> {
        let entity_id = self.required_entity_id(event)?;
        Ok(Some(UplinkMsg::new(
            self.ids.next(),
            UplinkPayload::AttributesRequest {
                entity_type: event.entity_type,
                entity_id,
            },
        )))
    }
}

impl RuleChainTranslator for JsonTranslators {
    fn rule_chain_metadata_request_event_to_uplink(
        &self,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>> {
        let entity_id = self.required_entity_id(event)?;
        Ok(Some(UplinkMsg::new(
            self.ids.next(),
            UplinkPayload::RuleChainMetadataRequest { entity_id },
        )))
    }
}

impl EntityTranslator for JsonTranslators {
    fn credentials_request_event_to_uplink(
        &self,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>> {
        let entity_id = self.required_entity_id(event)?;
        Ok(Some(UplinkMsg::new(
            self.ids.next(),
            UplinkPayload::CredentialsRequest { entity_id },
        )))
    }
}

impl WidgetBundleTranslator for JsonTranslators {
    fn widget_bundle_types_request_event_to_uplink(
        &self,
        event: &EventLogEntry,
    ) -> Result<Option<UplinkMsg>> {
        let entity_id = self.required_entity_id(event)?;
        Ok(Some(UplinkMsg::new(
            self.ids.next(),
            UplinkPayload::WidgetBundleTypesRequest { entity_id },
        )))
    }
}
