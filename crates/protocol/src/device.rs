//! Device identity extracted from gateway packets.

use crate::packet::{header_field, infos_field, value_to_string, RfPlayerPacket};
use crate::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const UNKNOWN_INFO: &str = "unknown";
pub const GATEWAY_PROTOCOL: &str = "gateway";
pub const GATEWAY_MODEL: &str = "gateway";

const ADDRESS_KEYS: [&str; 3] = ["id", "id_channel", "adr_channel"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RfDeviceId {
    pub protocol: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl RfDeviceId {
    pub fn new(protocol: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            address: address.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Stable identifier, `<protocol>_<address>`.
    pub fn id_string(&self) -> String {
        id_string(&self.protocol, &self.address)
    }

    pub fn group_code(&self) -> Option<String> {
        self.area_unit().map(|(group, _)| group.to_string())
    }

    pub fn unit_code(&self) -> Option<String> {
        self.area_unit().map(|(_, unit)| unit.to_string())
    }

    /// Split a numeric address into (group, unit) following each
    /// protocol's addressing scheme.
    fn area_unit(&self) -> Option<(u64, u64)> {
        let address: u64 = self.address.trim().parse().ok()?;
        match self.protocol.as_str() {
            "X2D" => Some((address % 16, address / 16)),
            "CHACON" => Some((address % 64, address / 64)),
            "X10" | "RTS" => Some((address / 16, address % 16)),
            _ => None,
        }
    }
}

pub fn id_string(protocol: &str, address: &str) -> String {
    format!("{protocol}_{address}")
}

/// Device-oriented event: the packet plus the device it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfDeviceEvent {
    pub device: RfDeviceId,
    pub data: RfPlayerPacket,
}

impl RfDeviceEvent {
    pub fn id_string(&self) -> String {
        self.device.id_string()
    }

    pub fn json(&self) -> Option<&Value> {
        self.data.as_json()
    }
}

/// Turns raw packets into device events.
#[derive(Debug, Clone)]
pub struct RfDeviceEventAdapter {
    gateway_id: String,
}

impl RfDeviceEventAdapter {
    /// `gateway_id` is used as address for the gateway's own text responses,
    /// usually the serial port path.
    pub fn new(gateway_id: impl Into<String>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
        }
    }

    pub fn adapt(&self, packet: RfPlayerPacket) -> Result<RfDeviceEvent> {
        let device = match &packet {
            RfPlayerPacket::Simple(_) => RfDeviceId::new(GATEWAY_PROTOCOL, self.gateway_id.clone())
                .with_model(GATEWAY_MODEL),
            RfPlayerPacket::Json(value) => parse_json_device(value)?,
        };
        Ok(RfDeviceEvent {
            device,
            data: packet,
        })
    }
}

/// Identify the emitter of a `ZIA33` JSON frame.
pub fn parse_json_device(event: &Value) -> Result<RfDeviceId> {
    let protocol = header_field(event, "protocolMeaning")
        .and_then(value_to_string)
        .ok_or(ProtocolError::MissingField("frame.header.protocolMeaning"))?;

    // The last present key wins: channel-qualified addresses are more specific.
    let address = ADDRESS_KEYS
        .iter()
        .filter_map(|key| infos_field(event, key).and_then(value_to_string))
        .last()
        .unwrap_or_else(|| UNKNOWN_INFO.to_string());

    let model = infos_field(event, "id_PHYMeaning")
        .and_then(value_to_string)
        .or_else(|| {
            header_field(event, "infoType")
                .and_then(value_to_string)
                .and_then(|info_type| model_for_info_type(&info_type))
                .map(str::to_string)
        });

    Ok(RfDeviceId {
        protocol,
        address,
        model,
    })
}

fn model_for_info_type(info_type: &str) -> Option<&'static str> {
    match info_type {
        "0" | "1" => Some("switch"),
        "2" => Some("detector"),
        "3" => Some("cover"),
        "10" => Some("thermostat"),
        "11" => Some("alarm"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn oregon_event() -> Value {
        json!({
            "frame": {
                "header": {
                    "frameType": "0", "dataFlag": "0", "rfLevel": "-71", "floorNoise": "-98",
                    "rfQuality": "5", "protocol": "5", "protocolMeaning": "OREGON",
                    "infoType": "9", "frequency": "433920"
                },
                "infos": {
                    "subType": "0", "id_PHY": "0x2A19", "id_PHYMeaning": "PCR800",
                    "adr_channel": "39168", "adr": "153", "channel": "0",
                    "qualifier": "48", "lowBatt": "0",
                    "measures": [
                        {"type": "total rain", "value": "1040.1", "unit": "mm"},
                        {"type": "current rain", "value": "0.00", "unit": "mm/h"}
                    ]
                }
            }
        })
    }

    fn blyss_event() -> Value {
        json!({
            "frame": {
                "header": {
                    "frameType": "0", "dataFlag": "0", "rfLevel": "-41", "floorNoise": "-97",
                    "rfQuality": "10", "protocol": "3", "protocolMeaning": "BLYSS",
                    "infoType": "1", "frequency": "433920"
                },
                "infos": {"subType": "0", "id": "4261483730", "subTypeMeaning": "OFF"}
            }
        })
    }

    #[test]
    fn adapts_oregon_frame() {
        let adapter = RfDeviceEventAdapter::new("/dev/ttyUSB0");
        let event = adapter.adapt(RfPlayerPacket::Json(oregon_event())).unwrap();
        assert_eq!(
            event.device,
            RfDeviceId::new("OREGON", "39168").with_model("PCR800")
        );
        assert_eq!(event.id_string(), "OREGON_39168");
    }

    #[test]
    fn adapts_blyss_frame_with_info_type_model() {
        let adapter = RfDeviceEventAdapter::new("/dev/ttyUSB0");
        let event = adapter.adapt(RfPlayerPacket::Json(blyss_event())).unwrap();
        assert_eq!(
            event.device,
            RfDeviceId::new("BLYSS", "4261483730").with_model("switch")
        );
    }

    #[test]
    fn simple_packets_come_from_the_gateway() {
        let adapter = RfDeviceEventAdapter::new("/dev/ttyUSB0");
        let event = adapter
            .adapt(RfPlayerPacket::Simple("Welcome to Ziblue".into()))
            .unwrap();
        assert_eq!(
            event.device,
            RfDeviceId::new("gateway", "/dev/ttyUSB0").with_model("gateway")
        );
    }

    #[test]
    fn missing_protocol_is_an_error() {
        let adapter = RfDeviceEventAdapter::new("port");
        let err = adapter
            .adapt(RfPlayerPacket::Json(json!({"frame": {"header": {}, "infos": {}}})))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField(_)));
    }

    #[test]
    fn missing_address_falls_back_to_unknown() {
        let device = parse_json_device(&json!({
            "frame": {"header": {"protocolMeaning": "TIC", "infoType": "15"}, "infos": {}}
        }))
        .unwrap();
        assert_eq!(device.address, UNKNOWN_INFO);
        assert_eq!(device.model, None);
    }

    #[test]
    fn group_and_unit_codes() {
        let device = RfDeviceId::new("X2D", "2095907073");
        assert_eq!(device.group_code().as_deref(), Some("1"));
        assert_eq!(device.unit_code().as_deref(), Some("130994192"));

        let device = RfDeviceId::new("CHACON", "146139014");
        assert_eq!(device.group_code().as_deref(), Some("6"));
        assert_eq!(device.unit_code().as_deref(), Some("2283422"));

        let device = RfDeviceId::new("X10", "123");
        assert_eq!(device.group_code().as_deref(), Some("7"));
        assert_eq!(device.unit_code().as_deref(), Some("11"));

        let device = RfDeviceId::new("RTS", "123");
        assert_eq!(device.group_code().as_deref(), Some("7"));
        assert_eq!(device.unit_code().as_deref(), Some("11"));

        let device = RfDeviceId::new("VISONIC", "123");
        assert_eq!(device.group_code(), None);
        assert_eq!(device.unit_code(), None);
    }
}
