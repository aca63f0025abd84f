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

use derive_more::{Display, Error};

/// The domain-facing error taxonomy every coordinator operation surfaces to its caller.
#[derive(Debug, Display, Error, Clone, PartialEq)]
pub enum ClimateHubError {
    #[display("authentication error: {reason}")]
    Authentication { reason: String },

    #[display("device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[display("device '{device_name}' is offline")]
    DeviceOffline {
        device_id: String,
        device_name: String,
    },

    /// Raised by the protocol layer, which only knows an endpoint id, not a
    /// friendly name. The coordinator catches this and re-raises
    /// `DeviceOffline` with the name resolved from its device map.
    #[display("endpoint unreachable: {message}")]
    EndpointUnreachable { message: String },

    #[display("invalid {param_name}: {value}{}", format_valid_values(valid_values))]
    InvalidParameter {
        param_name: String,
        value: String,
        valid_values: Vec<String>,
    },

    #[display("server is busy: {message}")]
    ServerBusy { message: String },

    #[display("data error: {message}")]
    DataError { message: String },

    #[display("configuration error: {message}")]
    Configuration { message: String },

    #[display("protocol error: {message}")]
    Protocol { message: String },

    /// Catch-all for anything else the API layer reports.
    #[display("API error: {message}")]
    Api {
        message: String,
        api_type: String,
        status: i64,
    },
}

fn format_valid_values(valid_values: &[String]) -> String {
    if valid_values.is_empty() {
        String::new()
    } else {
        format!(". Valid values: {}", valid_values.join(", "))
    }
}

impl ClimateHubError {
    pub fn invalid_parameter(
        param_name: impl Into<String>,
        value: impl std::fmt::Display,
        valid_values: &[&str],
    ) -> Self {
        Self::InvalidParameter {
            param_name: param_name.into(),
            value: value.to_string(),
            valid_values: valid_values.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    pub fn device_offline(device_id: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self::DeviceOffline {
            device_id: device_id.into(),
            device_name: device_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameter_lists_accepted_values() {
        let err = ClimateHubError::invalid_parameter("mode", "warm", &["cool", "heat", "auto"]);
        assert_eq!(
            err.to_string(),
            "invalid mode: warm. Valid values: cool, heat, auto"
        );
    }

    #[test]
    fn device_offline_names_both_identifiers() {
        let err = ClimateHubError::device_offline("d2", "Living Room AC");
        assert_eq!(err.to_string(), "device 'Living Room AC' is offline");
    }
}
