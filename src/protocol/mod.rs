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

//! Envelope construction and response parsing for the vendor's directive-based
//! control protocol. A control request wraps a `directive` containing a
//! `header`, an `endpoint` (device identity + a re-encoded cookie), and a
//! `payload` (the actual get/set parameters).

pub mod constants;

use std::collections::HashMap;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::device::{Device, ParamName, ParamValue};
use crate::error::ClimateHubError;

pub const LICENSE_PARAM: &str = "license";

/// Builds the common directive header every request shares.
///
/// `extra` fields are merged in after the fixed ones, so callers can add
/// request-specific keys (query-state's `messageType`/`timstamp`).
pub fn build_directive_header(
    namespace: &str,
    name: &str,
    message_id_prefix: &str,
    now_epoch: i64,
    extra: &[(&str, Value)],
) -> Value {
    let mut header = json!({
        "namespace": namespace,
        "name": name,
        "interfaceVersion": "2",
        "senderId": "sdk",
        "messageId": format!("{message_id_prefix}-{now_epoch}"),
    });
    let object = header.as_object_mut().expect("header is always an object");
    for (key, value) in extra {
        object.insert((*key).to_string(), value.clone());
    }
    header
}

/// A minimal device identity used for a bulk state query.
#[derive(Debug, Clone, Serialize)]
pub struct QueriedDevice {
    pub did: String,
    #[serde(rename = "devSession")]
    pub dev_session: String,
}

/// Builds the `device/control/v2/querystate` request body.
///
/// Note the literal `timstamp` key (not a typo we introduced): the vendor's
/// own API expects it misspelled.
pub fn build_query_state_request(devices: &[QueriedDevice], userid: &str, now_epoch: i64) -> Value {
    let timestamp = now_epoch.to_string();
    let header = build_directive_header(
        "DNA.QueryState",
        "queryState",
        userid,
        now_epoch,
        &[
            ("messageType", json!("controlgw.batch")),
            ("timstamp", json!(timestamp)),
        ],
    );
    json!({
        "directive": {
            "header": header,
            "payload": { "studata": devices, "msgtype": "batch" },
        }
    })
}

/// Builds the `device/control/v2/sdkcontrol` request body for either a "get"
/// or a "set" action.
pub fn build_control_request(
    device: &Device,
    action: &str,
    params: &[&str],
    vals: Vec<Vec<Value>>,
    now_epoch: i64,
) -> Result<Value, ClimateHubError> {
    let decoded = device.cookie.decode().map_err(|e| ClimateHubError::Protocol {
        message: format!("malformed device cookie: {e}"),
    })?;

    let mapped_cookie_json = json!({
        "device": {
            "id": decoded.terminalid,
            "key": decoded.aeskey,
            "devSession": device.dev_session,
            "aeskey": decoded.aeskey,
            "did": device.endpoint_id,
            "pid": device.product_id,
            "mac": device.mac,
        }
    })
    .to_string();
    let mapped_cookie = base64::engine::general_purpose::STANDARD.encode(mapped_cookie_json);

    let mut vals = vals;
    if params.len() == 1 && action == "get" {
        vals = vec![vec![json!({"val": 0, "idx": 1})]];
    }

    let header = build_directive_header(
        "DNA.KeyValueControl",
        "KeyValueControl",
        &device.endpoint_id,
        now_epoch,
        &[],
    );

    Ok(json!({
        "directive": {
            "header": header,
            "endpoint": {
                "devicePairedInfo": {
                    "did": device.endpoint_id,
                    "pid": device.product_id,
                    "mac": device.mac,
                    "devicetypeflag": device.device_type_flag,
                    "cookie": mapped_cookie,
                },
                "endpointId": device.endpoint_id,
                "cookie": {},
                "devSession": device.dev_session,
            },
            "payload": {
                "act": action,
                "params": params,
                "vals": vals,
                "did": device.endpoint_id,
            },
        }
    }))
}

/// Builds a "set" control request from a name -> value map, one `idx: 1` val
/// slot per parameter, in the same iteration order as `params`.
pub fn build_set_request(
    device: &Device,
    values: &HashMap<ParamName, ParamValue>,
    now_epoch: i64,
) -> Result<Value, ClimateHubError> {
    let params: Vec<&str> = values.keys().map(String::as_str).collect();
    let vals = values
        .values()
        .map(|v| vec![json!({"idx": 1, "val": v})])
        .collect();
    build_control_request(device, "set", &params, vals, now_epoch)
}

#[derive(Debug, Deserialize)]
struct StateResponseEnvelope {
    event: StateEvent,
}

#[derive(Debug, Deserialize)]
struct StateEvent {
    payload: StatePayload,
}

#[derive(Debug, Deserialize)]
pub struct StatePayload {
    pub status: i64,
    pub data: Vec<Value>,
}

/// Parses a `device/control/v2/querystate` response.
pub fn parse_state_response(response: &Value) -> Result<StatePayload, ClimateHubError> {
    let envelope: StateResponseEnvelope =
        serde_json::from_value(response.clone()).map_err(|_| ClimateHubError::Protocol {
            message: format!("malformed envelope in state response: {response}"),
        })?;
    if envelope.event.payload.status != 0 {
        return Err(ClimateHubError::Protocol {
            message: format!("invalid state response: {response}"),
        });
    }
    Ok(envelope.event.payload)
}

#[derive(Debug, Deserialize)]
struct ControlResponseEnvelope {
    event: ControlEvent,
}

#[derive(Debug, Deserialize)]
struct ControlEvent {
    header: ControlHeader,
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct ControlHeader {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default = "default_unknown_type")]
    r#type: String,
    #[serde(default = "default_unknown_message")]
    message: String,
    #[serde(default)]
    status: i64,
}

fn default_unknown_type() -> String {
    "UNKNOWN".to_string()
}

fn default_unknown_message() -> String {
    "Unknown error".to_string()
}

#[derive(Debug, Deserialize)]
struct ControlData {
    params: Vec<String>,
    vals: Vec<Vec<ValSlot>>,
}

#[derive(Debug, Deserialize)]
struct ValSlot {
    val: ParamValue,
}

/// Parses a `device/control/v2/sdkcontrol` response into a parameter map,
/// mapping vendor error statuses onto the domain error taxonomy.
pub fn parse_control_response(
    response: &Value,
) -> Result<HashMap<ParamName, ParamValue>, ClimateHubError> {
    let envelope: ControlResponseEnvelope =
        serde_json::from_value(response.clone()).map_err(|_| ClimateHubError::Protocol {
            message: format!("malformed envelope in control response: {response}"),
        })?;
    let event = envelope.event;

    if event.header.name == "ErrorResponse" {
        let error: ErrorPayload =
            serde_json::from_value(event.payload).unwrap_or(ErrorPayload {
                r#type: default_unknown_type(),
                message: default_unknown_message(),
                status: 0,
            });
        return Err(match error.status {
            -49002 => ClimateHubError::ServerBusy {
                message: format!("server is busy: {}", error.message),
            },
            -1005 => ClimateHubError::DataError {
                message: format!("data error: {}", error.message),
            },
            _ if error.r#type == "ENDPOINT_UNREACHABLE" => ClimateHubError::EndpointUnreachable {
                message: error.message,
            },
            _ => ClimateHubError::Api {
                message: error.message,
                api_type: error.r#type,
                status: error.status,
            },
        });
    }

    let data_field = event
        .payload
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| ClimateHubError::Protocol {
            message: format!("malformed envelope in control response: {response}"),
        })?;
    let data: ControlData =
        serde_json::from_str(data_field).map_err(|_| ClimateHubError::Protocol {
            message: format!("malformed control response data: {data_field}"),
        })?;

    let mut result = HashMap::with_capacity(data.params.len());
    for (name, slots) in data.params.into_iter().zip(data.vals.into_iter()) {
        if let Some(slot) = slots.into_iter().next() {
            result.insert(name, slot.val);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Cookie;

    fn sample_device() -> Device {
        let cookie_json = json!({"terminalid": "t1", "aeskey": "k1"}).to_string();
        let cookie = base64::engine::general_purpose::STANDARD.encode(cookie_json);
        Device {
            endpoint_id: "d1".into(),
            product_id: "000000000000000000000000c0620000".into(),
            friendly_name: "Living Room AC".into(),
            mac: "00:11:22:33:44:55".into(),
            dev_session: "sess".into(),
            device_type_flag: 1,
            cookie: Cookie(cookie),
            is_online: true,
            params: HashMap::new(),
            last_updated: None,
        }
    }

    #[test]
    fn query_state_request_carries_typo_field() {
        let devices = vec![QueriedDevice {
            did: "d1".into(),
            dev_session: "sess".into(),
        }];
        let request = build_query_state_request(&devices, "user1", 1_700_000_000);
        let header = &request["directive"]["header"];
        assert_eq!(header["timstamp"], "1700000000");
        assert_eq!(header["messageType"], "controlgw.batch");
        assert_eq!(header["messageId"], "user1-1700000000");
    }

    #[test]
    fn single_param_get_request_uses_idx_quirk() {
        let device = sample_device();
        let request =
            build_control_request(&device, "get", &["mode"], vec![], 1_700_000_000).unwrap();
        assert_eq!(request["directive"]["payload"]["vals"][0][0]["idx"], 1);
    }

    #[test]
    fn control_request_remaps_cookie_fields() {
        let device = sample_device();
        let request =
            build_control_request(&device, "get", &[], vec![], 1_700_000_000).unwrap();
        let cookie_b64 = request["directive"]["endpoint"]["devicePairedInfo"]["cookie"]
            .as_str()
            .unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(cookie_b64)
            .unwrap();
        let mapped: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(mapped["device"]["id"], "t1");
        assert_eq!(mapped["device"]["key"], "k1");
        assert_eq!(mapped["device"]["did"], "d1");
    }

    #[test]
    fn parse_control_response_zips_params_and_values() {
        let inner = json!({
            "params": ["temp", "pwr"],
            "vals": [[{"val": 220}], [{"val": 1}]],
        })
        .to_string();
        let response = json!({
            "event": {
                "header": {"name": "KeyValueControl"},
                "payload": {"status": 0, "data": inner},
            }
        });
        let parsed = parse_control_response(&response).unwrap();
        assert_eq!(parsed.get("temp"), Some(&220));
        assert_eq!(parsed.get("pwr"), Some(&1));
    }

    #[test]
    fn parse_control_response_maps_server_busy() {
        let response = json!({
            "event": {
                "header": {"name": "ErrorResponse"},
                "payload": {"type": "SOME_ERR", "message": "busy now", "status": -49002},
            }
        });
        let err = parse_control_response(&response).unwrap_err();
        assert!(matches!(err, ClimateHubError::ServerBusy { .. }));
    }

    #[test]
    fn parse_control_response_maps_device_offline() {
        let response = json!({
            "event": {
                "header": {"name": "ErrorResponse"},
                "payload": {"type": "ENDPOINT_UNREACHABLE", "message": "gone", "status": -1},
            }
        });
        let err = parse_control_response(&response).unwrap_err();
        assert!(matches!(err, ClimateHubError::EndpointUnreachable { .. }));
    }

    #[test]
    fn parse_state_response_rejects_nonzero_status() {
        let response = json!({"event": {"payload": {"status": 1, "data": []}}});
        assert!(parse_state_response(&response).is_err());
    }
}
