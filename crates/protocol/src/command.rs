use crate::{ProtocolError, Result};

/// Commands always sent first after the link is opened.
pub const MINIMUM_SCRIPT: [&str; 1] = ["FORMAT JSON"];

/// Protocol names accepted by the `RECEIVER` command.
pub const RECEIVER_MODES: [&str; 17] = [
    "*",
    "X10",
    "RTS",
    "VISONIC",
    "BLYSS",
    "CHACON",
    "OREGONV1",
    "OREGONV2",
    "OREGONV3/OWL",
    "DOMIA",
    "X2D",
    "KD101",
    "PARROT",
    "TIC",
    "FS20",
    "JAMMING",
    "EDISIO",
];

/// Protocol names the gateway can emit on (`ASSOC`, `ON`, `OFF`, `DIM`...).
pub const COMMAND_PROTOCOLS: [&str; 16] = [
    "X10",
    "RTS",
    "VISONIC433",
    "VISONIC868",
    "CHACON",
    "DOMIA",
    "X2D433",
    "X2D868",
    "X2DSHUTTER",
    "X2DELEC",
    "X2DGAS",
    "BLYSS",
    "PARROT",
    "KD101",
    "FS20",
    "EDISIO",
];

pub fn validate_receiver_protocol(protocol: &str) -> Result<()> {
    if RECEIVER_MODES.contains(&protocol) {
        Ok(())
    } else {
        Err(ProtocolError::UnknownReceiverProtocol(protocol.to_string()))
    }
}

pub fn validate_command_protocol(protocol: &str) -> Result<()> {
    if COMMAND_PROTOCOLS.contains(&protocol) {
        Ok(())
    } else {
        Err(ProtocolError::UnknownCommandProtocol(protocol.to_string()))
    }
}

/// `RECEIVER -* +X2D +RTS`: disable every receiver then enable the listed ones.
pub fn receiver_command(protocols: &[String]) -> Option<String> {
    if protocols.is_empty() {
        return None;
    }
    Some(format!("RECEIVER -* +{}", protocols.join(" +")))
}

/// Split free-form init commands on `;` and newlines.
pub fn split_init_commands(raw: &str) -> Vec<String> {
    raw.split([';', '\n'])
        .map(str::trim)
        .filter(|cmd| !cmd.is_empty())
        .map(str::to_string)
        .collect()
}

/// Full script played on connect: minimum script, receiver selection, then
/// user commands.
pub fn init_script(receiver_protocols: Option<&[String]>, init_commands: Option<&str>) -> Vec<String> {
    let mut script: Vec<String> = MINIMUM_SCRIPT.iter().map(|s| s.to_string()).collect();
    if let Some(receiver) = receiver_protocols.and_then(receiver_command) {
        script.push(receiver);
    }
    if let Some(raw) = init_commands {
        script.extend(split_init_commands(raw));
    }
    script
}

pub fn pairing_command(protocol: &str, address: &str) -> Result<String> {
    validate_command_protocol(protocol)?;
    let address = address.trim();
    if address.is_empty() || address.contains(char::is_whitespace) {
        return Err(ProtocolError::InvalidCommand(format!(
            "invalid pairing address {address:?}"
        )));
    }
    Ok(format!("ASSOC {protocol} ID {address}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn init_script_starts_with_minimum_script() {
        assert_eq!(init_script(None, None), vec!["FORMAT JSON".to_string()]);
    }

    #[test]
    fn init_script_selects_receivers_before_user_commands() {
        let protocols = vec!["X2D".to_string(), "RTS".to_string()];
        let script = init_script(Some(&protocols), Some("LEDACTIVITY 0; JAMMING 10\n"));
        assert_eq!(
            script,
            vec![
                "FORMAT JSON".to_string(),
                "RECEIVER -* +X2D +RTS".to_string(),
                "LEDACTIVITY 0".to_string(),
                "JAMMING 10".to_string(),
            ]
        );
    }

    #[test]
    fn empty_receiver_list_sends_no_receiver_command() {
        assert_eq!(receiver_command(&[]), None);
    }

    #[test]
    fn pairing_command_validates_protocol() {
        assert_eq!(
            pairing_command("X2D868", "12345").unwrap(),
            "ASSOC X2D868 ID 12345"
        );
        assert!(matches!(
            pairing_command("OREGON", "1"),
            Err(ProtocolError::UnknownCommandProtocol(_))
        ));
        assert!(pairing_command("RTS", " ").is_err());
    }

    #[test]
    fn receiver_modes_include_wildcard() {
        assert!(validate_receiver_protocol("*").is_ok());
        assert!(validate_receiver_protocol("OREGONV3/OWL").is_ok());
        assert!(validate_receiver_protocol("FOO").is_err());
    }
}
