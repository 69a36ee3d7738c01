use rfplayer_gateway::{EntitySnapshot, EntityState, GatewaySignal};
use rfplayer_profiles::{CoverState, DeviceProfile};
use rfplayer_protocol::{RfDeviceEvent, RfPlayerPacket};
use serde_json::{json, Value};

pub fn state_text(state: &EntityState) -> String {
    match state {
        EntityState::Unknown => "unknown".to_string(),
        EntityState::Measurement { value, unit } => match unit {
            Some(unit) if !value.is_nan() => format!("{value} {unit}"),
            _ => value.to_string(),
        },
        EntityState::OnOff { on } => if *on { "on" } else { "off" }.to_string(),
        EntityState::Cover { state } => match state {
            CoverState::Open => "open".to_string(),
            CoverState::Closed => "closed".to_string(),
        },
        EntityState::Climate {
            hvac_mode,
            preset_mode,
        } => format!(
            "{} (preset {})",
            hvac_mode.as_deref().unwrap_or("unknown"),
            preset_mode.as_deref().unwrap_or("unknown")
        ),
    }
}

pub fn snapshot_line(snapshot: &EntitySnapshot) -> String {
    format!(
        "{:<14} {:<40} {}",
        snapshot.platform.as_str(),
        snapshot.unique_id,
        state_text(&snapshot.state)
    )
}

fn event_payload(event: &RfDeviceEvent) -> String {
    match &event.data {
        RfPlayerPacket::Simple(text) => text.clone(),
        RfPlayerPacket::Json(value) => value.to_string(),
    }
}

pub fn signal_line(signal: &GatewaySignal) -> String {
    match signal {
        GatewaySignal::Event(event) => {
            format!("event   {} {}", event.id_string(), event_payload(event))
        }
        GatewaySignal::Availability(available) => format!(
            "gateway {}",
            if *available { "available" } else { "unavailable" }
        ),
        GatewaySignal::DeviceAdded(id) => format!("device  {id} added"),
        GatewaySignal::DeviceRemoved(id) => format!("device  {id} removed"),
        GatewaySignal::EntityUpdated(snapshot) => format!("entity  {}", snapshot_line(snapshot)),
    }
}

pub fn signal_json(signal: &GatewaySignal) -> Value {
    match signal {
        GatewaySignal::Event(event) => json!({"type": "event", "event": event}),
        GatewaySignal::Availability(available) => {
            json!({"type": "availability", "available": available})
        }
        GatewaySignal::DeviceAdded(id) => json!({"type": "device_added", "device": id}),
        GatewaySignal::DeviceRemoved(id) => json!({"type": "device_removed", "device": id}),
        GatewaySignal::EntityUpdated(snapshot) => json!({"type": "entity", "entity": snapshot}),
    }
}

pub fn profile_json(profile: &DeviceProfile) -> Value {
    let platforms: Vec<&str> = profile
        .platforms
        .platforms()
        .into_iter()
        .map(|p| p.as_str())
        .collect();
    let entities: Vec<Value> = profile
        .platforms
        .all()
        .into_iter()
        .map(|config| json!({"platform": config.platform(), "name": config.name()}))
        .collect();
    json!({
        "name": profile.name,
        "info_type": profile.match_rule.info_type(),
        "platforms": platforms,
        "entities": entities,
    })
}
