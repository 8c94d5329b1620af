//! EdgeLink 协议层 - 边缘与云端之间的消息类型
//!
//! 本 crate 只定义线上消息结构，不包含任何传输与业务逻辑：
//! - 上行：`UplinkMsg` / `UplinkPayload` / `UplinkResponseMsg`
//! - 下行：`DownlinkMsg` / `DownlinkResponseMsg` / `EdgeConfiguration`
//! - 枚举：`EntityType` / `ActionType`
//!
//! 所有类型 serde 可序列化，传输实现自行决定帧格式。

pub mod downlink;
pub mod entity;
pub mod uplink;

pub use downlink::{DownlinkMsg, DownlinkResponseMsg, EdgeConfiguration};
pub use entity::{ActionType, EntityType};
pub use uplink::{UplinkMsg, UplinkPayload, UplinkResponseMsg};
