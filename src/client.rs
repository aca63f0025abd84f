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

//! HTTP client for the vendor's cloud API: login, family/device discovery,
//! bulk state queries, and parameter get/set.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use reqwest::Client as HttpClient;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::crypto::{aes128_cbc_zero_pad, md5_hex, md5_raw, sha1_hex};
use crate::device::{Device, Family, ParamName, ParamValue, Region};
use crate::error::ClimateHubError;
use crate::protocol::constants::{self, api_base_url};
use crate::protocol::{
    self, LICENSE_PARAM, QueriedDevice, StatePayload, build_control_request,
    build_query_state_request, parse_control_response, parse_state_response,
};

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs() as i64
}

#[derive(Debug, Default)]
struct Session {
    loginsession: Option<String>,
    userid: Option<String>,
}

/// A logged-in (or not-yet-logged-in) handle to the vendor's cloud API.
///
/// Cheap to clone: the underlying `reqwest::Client` pools connections, and
/// the session token is shared behind a lock so every clone sees the same
/// logged-in state.
#[derive(Clone)]
pub struct CloudApiClient {
    http: HttpClient,
    base_url: &'static str,
    session: std::sync::Arc<RwLock<Session>>,
}

impl CloudApiClient {
    pub fn new(region: Region) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: api_base_url(region),
            session: std::sync::Arc::new(RwLock::new(Session::default())),
        }
    }

    async fn headers(&self, extra: &[(&'static str, String)]) -> reqwest::header::HeaderMap {
        let session = self.session.read().await;
        let mut map = reqwest::header::HeaderMap::new();
        let insert = |map: &mut reqwest::header::HeaderMap, key: &'static str, value: String| {
            if let Ok(value) = reqwest::header::HeaderValue::from_str(&value) {
                map.insert(key, value);
            }
        };
        insert(
            &mut map,
            "Content-Type",
            "application/x-java-serialized-object".to_string(),
        );
        insert(&mut map, "licenseId", constants::LICENSE_ID.to_string());
        insert(&mut map, "lid", constants::LICENSE_ID.to_string());
        insert(&mut map, "language", "en".to_string());
        insert(
            &mut map,
            "appVersion",
            constants::SPOOF_APP_VERSION.to_string(),
        );
        insert(
            &mut map,
            "User-Agent",
            constants::SPOOF_USER_AGENT.to_string(),
        );
        insert(&mut map, "system", constants::SPOOF_SYSTEM.to_string());
        insert(
            &mut map,
            "appPlatform",
            constants::SPOOF_APP_PLATFORM.to_string(),
        );
        insert(
            &mut map,
            "loginsession",
            session.loginsession.clone().unwrap_or_default(),
        );
        insert(&mut map, "userid", session.userid.clone().unwrap_or_default());
        for (key, value) in extra {
            insert(&mut map, key, value.clone());
        }
        map
    }

    async fn post_json(
        &self,
        endpoint: &str,
        body: Option<Value>,
        extra_headers: &[(&'static str, String)],
        query: &[(&str, &str)],
    ) -> Result<Value, ClimateHubError> {
        let url = format!("{}/{endpoint}", self.base_url);
        debug!("POST {endpoint}");
        let mut request = self
            .http
            .post(&url)
            .headers(self.headers(extra_headers).await)
            .query(query);
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(&body).expect("json serializes"));
        }
        let response = request.send().await.map_err(|e| ClimateHubError::Protocol {
            message: format!("network error calling {endpoint}: {e}"),
        })?;
        let text = response.text().await.map_err(|e| ClimateHubError::Protocol {
            message: format!("failed reading response body from {endpoint}: {e}"),
        })?;
        serde_json::from_str(&text).map_err(|_| ClimateHubError::DataError {
            message: format!("failed to parse JSON response from {endpoint}: {text}"),
        })
    }

    async fn post_raw(
        &self,
        endpoint: &str,
        raw_body: Vec<u8>,
        extra_headers: &[(&'static str, String)],
    ) -> Result<Value, ClimateHubError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .http
            .post(&url)
            .headers(self.headers(extra_headers).await)
            .body(raw_body)
            .send()
            .await
            .map_err(|e| ClimateHubError::Protocol {
                message: format!("network error calling {endpoint}: {e}"),
            })?;
        let text = response.text().await.map_err(|e| ClimateHubError::Protocol {
            message: format!("failed reading response body from {endpoint}: {e}"),
        })?;
        serde_json::from_str(&text).map_err(|_| ClimateHubError::DataError {
            message: format!("failed to parse JSON response from {endpoint}: {text}"),
        })
    }

    /// Logs in, storing the session token for subsequent requests. Must be
    /// called before any other method.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClimateHubError> {
        let timestamp = now_epoch();

        let sha_password = sha1_hex(&format!("{password}{}", constants::PASSWORD_ENCRYPT_KEY));
        let payload = serde_json::json!({
            "email": email,
            "password": sha_password,
            "companyid": constants::COMPANY_ID,
            "lid": constants::LICENSE_ID,
        });
        let json_payload = serde_json::to_string(&payload).expect("json serializes");

        let token = md5_hex(&format!("{json_payload}{}", constants::BODY_ENCRYPT_KEY));
        let key = md5_raw(&format!(
            "{timestamp}{}",
            constants::TIMESTAMP_TOKEN_ENCRYPT_KEY
        ));
        let encrypted = aes128_cbc_zero_pad(
            &constants::AES_INITIAL_VECTOR,
            &key,
            json_payload.as_bytes(),
        );

        let response = self
            .post_raw(
                "account/login",
                encrypted,
                &[
                    ("timestamp", timestamp.to_string()),
                    ("token", token),
                ],
            )
            .await?;

        if response.get("status").and_then(Value::as_i64) == Some(0) {
            let loginsession = response
                .get("loginsession")
                .and_then(Value::as_str)
                .ok_or_else(|| ClimateHubError::Authentication {
                    reason: "login response missing loginsession".to_string(),
                })?
                .to_string();
            let userid = response
                .get("userid")
                .and_then(Value::as_str)
                .ok_or_else(|| ClimateHubError::Authentication {
                    reason: "login response missing userid".to_string(),
                })?
                .to_string();
            let mut session = self.session.write().await;
            session.loginsession = Some(loginsession);
            session.userid = Some(userid);
            Ok(())
        } else {
            Err(ClimateHubError::Authentication {
                reason: format!("login failed: {response}"),
            })
        }
    }

    pub async fn is_logged_in(&self) -> bool {
        let session = self.session.read().await;
        session.loginsession.is_some() && session.userid.is_some()
    }

    /// Returns `(loginsession, userid)` after a successful [`Self::login`],
    /// for wiring up a [`crate::push::CloudPushListener`] against the same
    /// session.
    pub async fn session_credentials(&self) -> Option<(String, String)> {
        let session = self.session.read().await;
        Some((session.loginsession.clone()?, session.userid.clone()?))
    }

    async fn userid(&self) -> String {
        self.session.read().await.userid.clone().unwrap_or_default()
    }

    pub async fn get_families(&self) -> Result<Vec<Family>, ClimateHubError> {
        let response = self
            .post_json("appsync/group/member/getfamilylist", None, &[], &[])
            .await?;
        if response.get("status").and_then(Value::as_i64) == Some(0) {
            let families = response
                .get("data")
                .and_then(|d| d.get("familyList"))
                .cloned()
                .unwrap_or(Value::Array(vec![]));
            serde_json::from_value(families).map_err(|_| ClimateHubError::DataError {
                message: format!("failed to parse family list: {response}"),
            })
        } else {
            Err(ClimateHubError::Protocol {
                message: format!("failed to get families: {response}"),
            })
        }
    }

    /// Lists devices belonging to a family, optionally including devices
    /// shared from other accounts.
    pub async fn get_devices(&self, family_id: &str, shared: bool) -> Result<Vec<Value>, ClimateHubError> {
        let response = self
            .post_json(
                "appsync/group/dev/query",
                None,
                &[("familyid", family_id.to_string())],
                &[],
            )
            .await?;
        if response.get("status").and_then(Value::as_i64) != Some(0) {
            return Err(ClimateHubError::Protocol {
                message: format!("failed to get devices: {response}"),
            });
        }
        let data = response.get("data").cloned().unwrap_or(Value::Null);
        let mut devices: Vec<Value> = data
            .get("endpoints")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if shared {
            if let Some(shared_devices) = data.get("shareFromOther").and_then(Value::as_array) {
                devices.extend(shared_devices.iter().cloned());
            }
        }
        Ok(devices)
    }

    pub async fn bulk_query_device_state(
        &self,
        devices: &[(String, String)],
    ) -> Result<StatePayload, ClimateHubError> {
        let queried: Vec<QueriedDevice> = devices
            .iter()
            .map(|(endpoint_id, dev_session)| QueriedDevice {
                did: endpoint_id.clone(),
                dev_session: dev_session.clone(),
            })
            .collect();
        let body = build_query_state_request(&queried, &self.userid().await, now_epoch());
        let response = self
            .post_json("device/control/v2/querystate", Some(body), &[], &[])
            .await?;
        parse_state_response(&response)
    }

    pub async fn get_device_params(
        &self,
        device: &Device,
        params: &[&str],
    ) -> Result<HashMap<ParamName, ParamValue>, ClimateHubError> {
        let body = build_control_request(device, "get", params, vec![], now_epoch())?;
        let response = self
            .post_json(
                "device/control/v2/sdkcontrol",
                Some(body),
                &[],
                &[(LICENSE_PARAM, constants::LICENSE)],
            )
            .await?;
        parse_control_response(&response)
    }

    pub async fn set_device_params(
        &self,
        device: &Device,
        values: &HashMap<ParamName, ParamValue>,
    ) -> Result<HashMap<ParamName, ParamValue>, ClimateHubError> {
        let body = protocol::build_set_request(device, values, now_epoch())?;
        let response = self
            .post_json(
                "device/control/v2/sdkcontrol",
                Some(body),
                &[],
                &[(LICENSE_PARAM, constants::LICENSE)],
            )
            .await?;
        parse_control_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_against(server: &MockServer) -> CloudApiClient {
        let client = CloudApiClient::new(Region::Eu);
        // Tests never touch the real vendor host; point the client at wiremock.
        let leaked_url: &'static str = Box::leak(server.uri().into_boxed_str());
        CloudApiClient {
            base_url: leaked_url,
            ..client
        }
    }

    #[tokio::test]
    async fn login_stores_session_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/account/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": 0,
                "loginsession": "session-token",
                "userid": "user-1",
            })))
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        client.login("user@example.com", "hunter2").await.unwrap();
        assert!(client.is_logged_in().await);
    }

    #[tokio::test]
    async fn login_surfaces_authentication_error_on_nonzero_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/account/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": -1, "message": "bad creds"})),
            )
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        let err = client.login("user@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, ClimateHubError::Authentication { .. }));
    }

    #[tokio::test]
    async fn get_families_parses_family_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/appsync/group/member/getfamilylist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": 0,
                "data": {"familyList": [{"familyid": "fam-1"}]},
            })))
            .mount(&server)
            .await;

        let client = client_against(&server).await;
        let families = client.get_families().await.unwrap();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].family_id, "fam-1");
    }
}
