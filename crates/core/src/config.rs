//! Device creation options.

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// GPU selection hint forwarded to context creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreference {
    #[default]
    Default,
    HighPerformance,
    LowPower,
}

impl PowerPreference {
    /// The string WebGL context attributes expect.
    pub fn as_str(self) -> &'static str {
        match self {
            PowerPreference::Default => "default",
            PowerPreference::HighPerformance => "high-performance",
            PowerPreference::LowPower => "low-power",
        }
    }
}

/// Options controlling context creation and device limits.
///
/// Every field is optional in JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOptions {
    /// Request a multisampled back buffer.
    pub antialias: bool,
    /// Request an alpha channel on the back buffer.
    pub alpha: bool,
    /// Request a depth buffer on the back buffer.
    pub depth: bool,
    /// Request a stencil buffer on the back buffer.
    pub stencil: bool,
    pub preserve_drawing_buffer: bool,
    /// Try a WebGL 2.0 context before falling back to WebGL 1.0.
    pub prefer_webgl2: bool,
    pub power_preference: PowerPreference,
    /// Caps the texture size reported by the driver.
    pub max_texture_size: Option<u32>,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            antialias: true,
            alpha: true,
            depth: true,
            stencil: true,
            preserve_drawing_buffer: false,
            prefer_webgl2: true,
            power_preference: PowerPreference::Default,
            max_texture_size: None,
        }
    }
}

impl DeviceOptions {
    /// Parses options from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::InvalidOptions` if the JSON is malformed or a
    /// field has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, DeviceError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let options = DeviceOptions::from_json("{}").unwrap();
        assert_eq!(options, DeviceOptions::default());
    }

    #[test]
    fn partial_object_overrides_only_named_fields() {
        let options =
            DeviceOptions::from_json(r#"{"antialias": false, "max_texture_size": 2048}"#).unwrap();
        assert!(!options.antialias);
        assert_eq!(options.max_texture_size, Some(2048));
        assert!(options.prefer_webgl2, "unnamed field should keep default");
    }

    #[test]
    fn power_preference_uses_webgl_spelling() {
        let options =
            DeviceOptions::from_json(r#"{"power_preference": "high-performance"}"#).unwrap();
        assert_eq!(options.power_preference, PowerPreference::HighPerformance);
        assert_eq!(options.power_preference.as_str(), "high-performance");
    }

    #[test]
    fn wrong_type_is_an_error() {
        let err = DeviceOptions::from_json(r#"{"alpha": "yes"}"#).unwrap_err();
        assert!(
            matches!(err, DeviceError::InvalidOptions(_)),
            "expected InvalidOptions, got {err:?}"
        );
    }

    #[test]
    fn serializes_back_to_json() {
        let json = serde_json::to_string(&DeviceOptions::default()).unwrap();
        assert!(json.contains("\"prefer_webgl2\":true"), "got: {json}");
    }
}
