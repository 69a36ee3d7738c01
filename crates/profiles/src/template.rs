use crate::{ProfileError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"));

/// Placeholders a command template may reference.
pub const KNOWN_PLACEHOLDERS: [&str; 6] = [
    "address",
    "protocol",
    "group_code",
    "unit_code",
    "brightness",
    "preset_mode",
];

/// Values substituted into command templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandParams {
    values: BTreeMap<&'static str, String>,
}

impl CommandParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    pub fn set(&mut self, key: &'static str, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// A gateway command with `{placeholder}` slots, e.g. `ON ID {address} BLYSS`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct CommandTemplate {
    template: String,
}

impl TryFrom<String> for CommandTemplate {
    type Error = ProfileError;

    fn try_from(template: String) -> Result<Self> {
        for caps in PLACEHOLDER.captures_iter(&template) {
            let name = &caps[1];
            if !KNOWN_PLACEHOLDERS.contains(&name) {
                return Err(ProfileError::UnknownPlaceholder {
                    template: template.clone(),
                    placeholder: name.to_string(),
                });
            }
        }
        Ok(Self { template })
    }
}

impl CommandTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        Self::try_from(template.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn render(&self, params: &CommandParams) -> Result<String> {
        let mut out = String::with_capacity(self.template.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(&self.template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let name = name.as_str();
            let value = params
                .get(name)
                .ok_or_else(|| ProfileError::MissingParameter {
                    template: self.template.clone(),
                    placeholder: name.to_string(),
                })?;
            out.push_str(&self.template[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&self.template[last..]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_placeholders() {
        let template = CommandTemplate::parse("DIM ID {address} {protocol} %{brightness}").unwrap();
        let params = CommandParams::new()
            .with("address", "123")
            .with("protocol", "X10")
            .with("brightness", "50");
        assert_eq!(template.render(&params).unwrap(), "DIM ID 123 X10 %50");
    }

    #[test]
    fn rejects_unknown_placeholder_at_load() {
        let err = CommandTemplate::parse("ON {house}").unwrap_err();
        assert!(matches!(err, ProfileError::UnknownPlaceholder { .. }));
    }

    #[test]
    fn reports_missing_parameter() {
        let template = CommandTemplate::parse("ON ID {address} RTS").unwrap();
        let err = template.render(&CommandParams::new()).unwrap_err();
        assert!(matches!(err, ProfileError::MissingParameter { .. }));
    }

    #[test]
    fn template_without_placeholders_is_verbatim() {
        let template = CommandTemplate::parse("STATUS JSON").unwrap();
        assert_eq!(template.render(&CommandParams::new()).unwrap(), "STATUS JSON");
    }
}
