//! # RfPlayer protocol
//!
//! Line protocol spoken by RfPlayer RF gateways over their serial/USB link.
//!
//! ```text
//! host  ──  ZIA++<command>\n\r  ──>  gateway
//! host  <──  ZIA--<text>\n\r     ──  gateway   (simple responses)
//! host  <──  ZIA33<json>\n\r     ──  gateway   (RF event frames)
//! ```
//!
//! [`FrameDecoder`] turns the byte stream into [`RfPlayerPacket`]s and
//! [`RfDeviceEventAdapter`] attaches the emitting [`RfDeviceId`].

mod command;
mod device;
mod error;
mod frame;
mod packet;

pub use command::{
    init_script, pairing_command, receiver_command, split_init_commands,
    validate_command_protocol, validate_receiver_protocol, COMMAND_PROTOCOLS, MINIMUM_SCRIPT,
    RECEIVER_MODES,
};
pub use device::{
    id_string, parse_json_device, RfDeviceEvent, RfDeviceEventAdapter, RfDeviceId,
    GATEWAY_MODEL, GATEWAY_PROTOCOL, UNKNOWN_INFO,
};
pub use error::{ProtocolError, Result};
pub use frame::{
    encode_command, parse_packet, FrameDecoder, COMMAND_HEADER, END_OF_LINE, JSON_HEADER,
    MAX_LINE_BYTES, PACKET_HEADER_LEN, SIMPLE_HEADER, UNSUPPORTED_HEADERS,
};
pub use packet::{header_field, infos_field, value_to_string, RfPlayerPacket};
