/*
 * climate-hub-core
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::collections::HashMap;

use base64::Engine;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub type EndpointId = String;
pub type ParamName = String;
pub type ParamValue = i64;

/// Vendor API region. Picks both the HTTP base URL and the WebSocket relay host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Eu,
    Usa,
    Cn,
}

/// Air-conditioner operation mode (`ac_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum Mode {
    Cool = 0,
    Heat = 1,
    Dry = 2,
    Fan = 3,
    Auto = 4,
}

impl Mode {
    pub fn from_api(value: ParamValue) -> Option<Self> {
        match value {
            0 => Some(Self::Cool),
            1 => Some(Self::Heat),
            2 => Some(Self::Dry),
            3 => Some(Self::Fan),
            4 => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Air-conditioner fan speed (`ac_mark`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum FanSpeed {
    Auto = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Turbo = 4,
    Mute = 5,
}

impl FanSpeed {
    pub fn from_api(value: ParamValue) -> Option<Self> {
        match value {
            0 => Some(Self::Auto),
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            4 => Some(Self::Turbo),
            5 => Some(Self::Mute),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SwingAxis {
    Vertical,
    Horizontal,
}

impl SwingAxis {
    /// Parameter key this axis controls.
    pub fn param_name(self) -> &'static str {
        match self {
            Self::Vertical => "ac_vdir",
            Self::Horizontal => "ac_hdir",
        }
    }
}

/// The two product families the vendor's capability set distinguishes. See
/// `original_source/api/models.py::AuxProducts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductFamily {
    AcGeneric,
    HeatPump,
    Unknown,
}

const AC_GENERIC_IDS: [&str; 2] = [
    "000000000000000000000000c0620000",
    "0000000000000000000000002a4e0000",
];
const HEAT_PUMP_IDS: [&str; 1] = ["000000000000000000000000c3aa0000"];

impl ProductFamily {
    pub fn from_product_id(product_id: &str) -> Self {
        if AC_GENERIC_IDS.contains(&product_id) {
            Self::AcGeneric
        } else if HEAT_PUMP_IDS.contains(&product_id) {
            Self::HeatPump
        } else {
            Self::Unknown
        }
    }

    /// The "special" parameter set fetched in addition to the standard
    /// (get-everything) fetch, union-merged into `device.params`.
    pub fn special_params(self) -> &'static [&'static str] {
        match self {
            Self::AcGeneric => &["mode"],
            Self::HeatPump => &["hp_water_tank_temp"],
            Self::Unknown => &[],
        }
    }
}

/// The vendor's opaque `cookie` blob: base64 JSON containing `terminalid` and
/// `aeskey`. Per design note, this is treated as opaque and replayed
/// verbatim into every control envelope rather than normalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie(pub String);

#[derive(Debug, Deserialize)]
pub(crate) struct DecodedCookie {
    pub terminalid: String,
    pub aeskey: String,
}

impl Cookie {
    pub fn decode(&self) -> anyhow::Result<DecodedCookie> {
        let raw = base64::engine::general_purpose::STANDARD.decode(self.0.as_bytes())?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// A discovered HVAC endpoint and its last-known state. Mutated only by the
/// coordinator's monitor/discovery paths and by control-triggered refreshes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub endpoint_id: EndpointId,
    pub product_id: String,
    pub friendly_name: String,
    pub mac: String,
    pub dev_session: String,
    pub device_type_flag: i64,
    pub cookie: Cookie,

    /// Sourced from bulk state queries; authoritative for whether control
    /// operations are permitted.
    pub is_online: bool,

    pub params: HashMap<ParamName, ParamValue>,
    pub last_updated: Option<DateTime<Local>>,
}

impl Device {
    pub fn product_family(&self) -> ProductFamily {
        ProductFamily::from_product_id(&self.product_id)
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.params.get("temp").map(|t| *t as f64 / 10.0)
    }

    pub fn ambient_temperature(&self) -> Option<f64> {
        self.params.get("envtemp").map(|t| *t as f64 / 10.0)
    }

    pub fn mode(&self) -> Option<Mode> {
        self.params.get("ac_mode").copied().and_then(Mode::from_api)
    }

    pub fn fan_speed(&self) -> Option<FanSpeed> {
        self.params
            .get("ac_mark")
            .copied()
            .and_then(FanSpeed::from_api)
    }
}

/// A vendor grouping of devices. Transient: the coordinator uses families
/// only to enumerate devices during a discovery step; only device identity
/// crosses discovery cycles.
#[derive(Debug, Clone, Deserialize)]
pub struct Family {
    #[serde(rename = "familyid")]
    pub family_id: String,
}

/// The public, camelCase DTO shape for remote consumers (spec `# 6`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    pub endpoint_id: String,
    pub friendly_name: String,
    pub is_online: bool,
    /// The raw online flag as the vendor's bulk state query reports it
    /// (`1` online, `0` offline), alongside the already-booleanised
    /// `is_online` for callers that want the wire-level value.
    pub state: i64,
    pub last_updated: Option<DateTime<Local>>,
    pub params: HashMap<ParamName, ParamValue>,
    pub target_temperature: Option<f64>,
    pub ambient_temperature: Option<f64>,
    pub mode: Option<String>,
    pub fan_speed: Option<String>,
}

impl From<&Device> for DeviceDto {
    fn from(device: &Device) -> Self {
        Self {
            endpoint_id: device.endpoint_id.clone(),
            friendly_name: device.friendly_name.clone(),
            is_online: device.is_online,
            state: i64::from(device.is_online),
            last_updated: device.last_updated,
            params: device.params.clone(),
            target_temperature: device.target_temperature(),
            ambient_temperature: device.ambient_temperature(),
            mode: device.mode().map(|m| m.to_string()),
            fan_speed: device.fan_speed().map(|f| f.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device() -> Device {
        let mut params = HashMap::new();
        params.insert("temp".to_string(), 220);
        params.insert("envtemp".to_string(), 265);
        params.insert("ac_mode".to_string(), 0);
        Device {
            endpoint_id: "d1".into(),
            product_id: "000000000000000000000000c0620000".into(),
            friendly_name: "Living Room AC".into(),
            mac: "00:11:22:33:44:55".into(),
            dev_session: "sess".into(),
            device_type_flag: 1,
            cookie: Cookie("e30=".into()), // base64("{}")
            is_online: true,
            params,
            last_updated: None,
        }
    }

    #[test]
    fn product_family_dispatches_on_product_id() {
        let device = sample_device();
        assert_eq!(device.product_family(), ProductFamily::AcGeneric);
        assert_eq!(device.product_family().special_params(), &["mode"]);
    }

    #[test]
    fn temperature_accessors_convert_from_tenths() {
        let device = sample_device();
        assert_eq!(device.target_temperature(), Some(22.0));
        assert_eq!(device.ambient_temperature(), Some(26.5));
    }

    #[test]
    fn cookie_decodes_json_fields() {
        let raw = serde_json::json!({"terminalid": "t1", "aeskey": "k1"});
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw.to_string());
        let cookie = Cookie(encoded);
        let decoded = cookie.decode().expect("valid cookie");
        assert_eq!(decoded.terminalid, "t1");
        assert_eq!(decoded.aeskey, "k1");
    }

    #[test]
    fn dto_carries_human_readable_mode() {
        let device = sample_device();
        let dto = DeviceDto::from(&device);
        assert_eq!(dto.mode.as_deref(), Some("Cool"));
        assert_eq!(dto.target_temperature, Some(22.0));
    }
}
