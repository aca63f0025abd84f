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

//! The "digital twin" hub: discovers endpoints, keeps a live in-memory cache
//! of their state via per-device monitor loops, and dispatches control
//! commands. This is the piece everything else in the crate exists to feed
//! or to expose.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Notify, RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::CloudApiClient;
use crate::device::{Device, DeviceDto, EndpointId, ParamName, ParamValue};
use crate::error::ClimateHubError;
use crate::fanout::{Fanout, HubEvent};
use crate::protocol::constants::{AC_POWER, AC_TEMPERATURE_TARGET};
use crate::validation;

pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);
const MONITOR_ERROR_BACKOFF: Duration = Duration::from_secs(10);

/// Wire shape returned by `appsync/group/dev/query`. The vendor's response
/// carries the endpoint id under both `did` (used to join against the bulk
/// state query) and `endpointId` (the field the rest of the API uses); we
/// accept either.
#[derive(Debug, Deserialize)]
struct RawDeviceRecord {
    #[serde(rename = "endpointId", alias = "did")]
    endpoint_id: String,
    #[serde(rename = "productId")]
    product_id: String,
    #[serde(rename = "friendlyName", default = "default_friendly_name")]
    friendly_name: String,
    mac: String,
    #[serde(rename = "devSession")]
    dev_session: String,
    #[serde(rename = "devicetypeFlag")]
    device_type_flag: i64,
    cookie: String,
}

fn default_friendly_name() -> String {
    "Unnamed".to_string()
}

struct MonitorHandle {
    join: JoinHandle<()>,
    cancel: CancellationToken,
    trigger: Arc<Notify>,
    ready: watch::Receiver<bool>,
}

/// Orchestrates device discovery, monitoring, and control dispatch. Build
/// with [`Coordinator::new`] and call [`Coordinator::start`] once, from a
/// logged-in [`CloudApiClient`].
pub struct Coordinator {
    api: CloudApiClient,
    fanout: Fanout,
    devices: RwLock<HashMap<EndpointId, Device>>,
    monitors: RwLock<HashMap<EndpointId, MonitorHandle>>,
    discovery_task: RwLock<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    discovery_interval: Duration,
    monitor_interval: Duration,
}

impl Coordinator {
    pub fn new(api: CloudApiClient) -> Arc<Self> {
        Self::with_intervals(api, DEFAULT_DISCOVERY_INTERVAL, DEFAULT_MONITOR_INTERVAL)
    }

    pub fn with_intervals(
        api: CloudApiClient,
        discovery_interval: Duration,
        monitor_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            fanout: Fanout::new(),
            devices: RwLock::new(HashMap::new()),
            monitors: RwLock::new(HashMap::new()),
            discovery_task: RwLock::new(None),
            shutdown: CancellationToken::new(),
            discovery_interval,
            monitor_interval,
        })
    }

    /// Subscribes to device-update events. Callers that want the current
    /// state immediately should also call [`Coordinator::devices`] and treat
    /// it as an `InitialState` snapshot before reading from the receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<HubEvent> {
        self.fanout.subscribe()
    }

    pub async fn devices(&self) -> Vec<DeviceDto> {
        self.devices
            .read()
            .await
            .values()
            .map(DeviceDto::from)
            .collect()
    }

    pub async fn initial_state_event(&self) -> HubEvent {
        HubEvent::InitialState {
            devices: self.devices().await,
        }
    }

    /// Runs one discovery step, starts a monitor per discovered device,
    /// waits for every monitor's first cycle, then spawns the periodic
    /// discovery loop in the background. Returns once the cache reflects a
    /// real snapshot of device state.
    pub async fn start(self: &Arc<Self>) -> Result<(), ClimateHubError> {
        info!("starting coordinator");
        self.discovery_step().await;

        let device_ids: Vec<EndpointId> = self.devices.read().await.keys().cloned().collect();
        if device_ids.is_empty() {
            warn!("no devices found during initial discovery");
        } else {
            for device_id in &device_ids {
                self.start_monitor(device_id.clone()).await;
            }
            info!("waiting for initial per-device parameter fetch");
            let ready_receivers: Vec<watch::Receiver<bool>> = {
                let monitors = self.monitors.read().await;
                device_ids
                    .iter()
                    .filter_map(|id| monitors.get(id).map(|m| m.ready.clone()))
                    .collect()
            };
            join_all(ready_receivers.into_iter().map(|mut ready| async move {
                let _ = ready.wait_for(|v| *v).await;
            }))
            .await;
        }

        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.discovery_loop().await });
        *self.discovery_task.write().await = Some(task);

        info!("coordinator started and synchronized");
        Ok(())
    }

    /// Cancels the discovery loop and every monitor, awaiting their exit.
    pub async fn stop(self: &Arc<Self>) {
        self.shutdown.cancel();

        if let Some(task) = self.discovery_task.write().await.take() {
            task.abort();
            let _ = task.await;
        }

        let handles: Vec<MonitorHandle> = {
            let mut monitors = self.monitors.write().await;
            monitors.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.cancel.cancel();
            let _ = handle.join.await;
        }
        info!("coordinator stopped");
    }

    /// Finds a device by exact endpoint id, then exact friendly name
    /// (case-insensitive), then friendly-name substring (case-insensitive).
    /// The first match in iteration order wins.
    pub async fn find_device(&self, device_id: &str) -> Result<Device, ClimateHubError> {
        let devices = self.devices.read().await;
        if devices.is_empty() {
            return Err(ClimateHubError::DeviceNotFound {
                device_id: device_id.to_string(),
            });
        }
        if let Some(device) = devices.get(device_id) {
            return Ok(device.clone());
        }
        let needle = device_id.to_lowercase();
        if let Some(device) = devices
            .values()
            .find(|d| d.friendly_name.to_lowercase() == needle)
        {
            return Ok(device.clone());
        }
        if let Some(device) = devices
            .values()
            .find(|d| d.friendly_name.to_lowercase().contains(&needle))
        {
            return Ok(device.clone());
        }
        Err(ClimateHubError::DeviceNotFound {
            device_id: device_id.to_string(),
        })
    }

    /// Wakes a device's monitor loop immediately instead of waiting for its
    /// next periodic tick. A no-op if the device has no active monitor.
    pub async fn trigger_update(&self, device_id: &str) {
        if let Some(handle) = self.monitors.read().await.get(device_id) {
            handle.trigger.notify_one();
            debug!("update triggered for device {device_id}");
        }
    }

    /// Handles one push-relay frame per the upstream dispatch rule: a
    /// `msgtype=="push"` frame carrying `data.endpointId` triggers an
    /// immediate refresh for that device; everything else is forwarded
    /// unchanged to the fan-out.
    pub async fn dispatch_push_message(&self, message: Value) {
        let endpoint_id = (message.get("msgtype").and_then(Value::as_str) == Some("push"))
            .then(|| message.get("data").and_then(|d| d.get("endpointId")))
            .flatten()
            .and_then(Value::as_str)
            .map(str::to_string);

        match endpoint_id {
            Some(endpoint_id) => self.trigger_update(&endpoint_id).await,
            None => self.fanout.notify_cloud_message(message),
        }
    }

    async fn discovery_step(self: &Arc<Self>) {
        if let Err(e) = self.try_discovery_step().await {
            error!("error during discovery step: {e}");
        }
    }

    async fn try_discovery_step(self: &Arc<Self>) -> Result<(), ClimateHubError> {
        let families = self.api.get_families().await?;
        let mut discovered_ids = std::collections::HashSet::new();

        for family in families {
            let raw_devices = self.api.get_devices(&family.family_id, true).await?;
            if raw_devices.is_empty() {
                continue;
            }

            let records: Vec<RawDeviceRecord> = raw_devices
                .iter()
                .filter_map(|raw| match serde_json::from_value(raw.clone()) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("skipping malformed device record: {e}");
                        None
                    }
                })
                .collect();
            if records.is_empty() {
                continue;
            }

            let query_pairs: Vec<(String, String)> = records
                .iter()
                .map(|r| (r.endpoint_id.clone(), r.dev_session.clone()))
                .collect();
            let state = self.api.bulk_query_device_state(&query_pairs).await?;

            for record in records {
                discovered_ids.insert(record.endpoint_id.clone());
                let is_online = state
                    .data
                    .iter()
                    .find(|entry| {
                        entry.get("did").and_then(Value::as_str) == Some(&record.endpoint_id)
                    })
                    .and_then(|entry| entry.get("state"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0)
                    == 1;

                let mut devices = self.devices.write().await;
                match devices.get_mut(&record.endpoint_id) {
                    Some(existing) => existing.is_online = is_online,
                    None => {
                        info!("new device discovered: {}", record.endpoint_id);
                        let device = Device {
                            endpoint_id: record.endpoint_id.clone(),
                            product_id: record.product_id,
                            friendly_name: record.friendly_name,
                            mac: record.mac,
                            dev_session: record.dev_session,
                            device_type_flag: record.device_type_flag,
                            cookie: crate::device::Cookie(record.cookie),
                            is_online,
                            params: HashMap::new(),
                            last_updated: None,
                        };
                        let already_running = self.discovery_task.read().await.is_some();
                        devices.insert(record.endpoint_id.clone(), device);
                        drop(devices);
                        if already_running {
                            self.start_monitor(record.endpoint_id).await;
                        }
                    }
                }
            }
        }

        let removed_ids: Vec<EndpointId> = {
            let devices = self.devices.read().await;
            devices
                .keys()
                .filter(|id| !discovered_ids.contains(*id))
                .cloned()
                .collect()
        };
        for id in removed_ids {
            info!("device removed: {id}");
            if let Some(handle) = self.monitors.write().await.remove(&id) {
                handle.cancel.cancel();
                handle.join.abort();
            }
            self.devices.write().await.remove(&id);
        }

        Ok(())
    }

    async fn discovery_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return,
                () = tokio::time::sleep(self.discovery_interval) => {}
            }
            self.discovery_step().await;
        }
    }

    async fn start_monitor(self: &Arc<Self>, device_id: EndpointId) {
        if self.monitors.read().await.contains_key(&device_id) {
            return;
        }
        let trigger = Arc::new(Notify::new());
        let (ready_tx, ready_rx) = watch::channel(false);
        let cancel = self.shutdown.child_token();

        let this = Arc::clone(self);
        let monitor_trigger = Arc::clone(&trigger);
        let monitor_cancel = cancel.clone();
        let id_for_task = device_id.clone();
        let join = tokio::spawn(async move {
            this.monitor_loop(id_for_task, monitor_trigger, ready_tx, monitor_cancel)
                .await;
        });

        self.monitors.write().await.insert(
            device_id,
            MonitorHandle {
                join,
                cancel,
                trigger,
                ready: ready_rx,
            },
        );
    }

    async fn monitor_loop(
        self: Arc<Self>,
        device_id: EndpointId,
        trigger: Arc<Notify>,
        ready: watch::Sender<bool>,
        cancel: CancellationToken,
    ) {
        debug!("starting monitor for device {device_id}");
        loop {
            if cancel.is_cancelled() {
                return;
            }

            match self.monitor_tick(&device_id).await {
                Ok(()) => {
                    let _ = ready.send(true);
                }
                Err(e) => {
                    error!("error in monitor loop for {device_id}: {e}");
                    let _ = ready.send(true);
                    tokio::select! {
                        () = cancel.cancelled() => return,
                        () = tokio::time::sleep(MONITOR_ERROR_BACKOFF) => {}
                    }
                    continue;
                }
            }

            tokio::select! {
                () = cancel.cancelled() => return,
                () = trigger.notified() => debug!("monitor for {device_id} woken up by trigger"),
                () = tokio::time::sleep(self.monitor_interval) => debug!("monitor for {device_id} periodic wakeup"),
            }
        }
    }

    async fn monitor_tick(&self, device_id: &str) -> Result<(), ClimateHubError> {
        let is_online = match self.devices.read().await.get(device_id) {
            Some(device) => device.is_online,
            None => return Ok(()),
        };
        if !is_online {
            return Ok(());
        }

        let device = self
            .devices
            .read()
            .await
            .get(device_id)
            .cloned()
            .ok_or_else(|| ClimateHubError::DeviceNotFound {
                device_id: device_id.to_string(),
            })?;

        let params = self.fetch_params(&device).await?;

        let dto = {
            let mut devices = self.devices.write().await;
            let Some(stored) = devices.get_mut(device_id) else {
                return Ok(());
            };
            stored.params = params;
            stored.last_updated = Some(chrono::Local::now());
            DeviceDto::from(&*stored)
        };
        self.fanout.notify_update(&dto);
        Ok(())
    }

    async fn fetch_params(
        &self,
        device: &Device,
    ) -> Result<HashMap<ParamName, ParamValue>, ClimateHubError> {
        let mut params = self.api.get_device_params(device, &[]).await?;
        let special = device.product_family().special_params();
        if !special.is_empty() {
            let special_params = self.api.get_device_params(device, special).await?;
            params.extend(special_params);
        }
        Ok(params)
    }

    async fn execute_control(
        &self,
        device_id: &str,
        params: HashMap<ParamName, ParamValue>,
    ) -> Result<(), ClimateHubError> {
        let device = self.find_device(device_id).await?;
        if !device.is_online {
            return Err(ClimateHubError::device_offline(
                device.endpoint_id,
                device.friendly_name,
            ));
        }

        match self.api.set_device_params(&device, &params).await {
            Ok(_) => {
                self.trigger_update(&device.endpoint_id).await;
                Ok(())
            }
            Err(ClimateHubError::EndpointUnreachable { .. }) => Err(
                ClimateHubError::device_offline(device.endpoint_id, device.friendly_name),
            ),
            Err(e) => Err(e),
        }
    }

    pub async fn set_power(&self, device_id: &str, on: bool) -> Result<(), ClimateHubError> {
        let mut params = HashMap::new();
        params.insert(AC_POWER.to_string(), i64::from(on));
        self.execute_control(device_id, params).await
    }

    pub async fn set_temperature(
        &self,
        device_id: &str,
        celsius: f64,
    ) -> Result<(), ClimateHubError> {
        validation::validate_temperature(celsius)?;
        let mut params = HashMap::new();
        params.insert(
            AC_TEMPERATURE_TARGET.to_string(),
            validation::celsius_to_api(celsius),
        );
        self.execute_control(device_id, params).await
    }

    pub async fn set_mode(&self, device_id: &str, mode: &str) -> Result<(), ClimateHubError> {
        let mode = validation::validate_mode(mode)?;
        let (name, value) = validation::mode_param(mode);
        let mut params = HashMap::new();
        params.insert(name.to_string(), value);
        self.execute_control(device_id, params).await
    }

    pub async fn set_fan_speed(&self, device_id: &str, speed: &str) -> Result<(), ClimateHubError> {
        let speed = validation::validate_fan_speed(speed)?;
        let (name, value) = validation::fan_speed_param(speed);
        let mut params = HashMap::new();
        params.insert(name.to_string(), value);
        self.execute_control(device_id, params).await
    }

    pub async fn set_swing(
        &self,
        device_id: &str,
        direction: &str,
        on: bool,
    ) -> Result<(), ClimateHubError> {
        let axis = validation::validate_swing_direction(direction)?;
        let (name, value) = validation::swing_param(axis, on);
        let mut params = HashMap::new();
        params.insert(name.to_string(), value);
        self.execute_control(device_id, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device(id: &str, name: &str, online: bool) -> Device {
        Device {
            endpoint_id: id.to_string(),
            product_id: "000000000000000000000000c0620000".to_string(),
            friendly_name: name.to_string(),
            mac: "00:11:22:33:44:55".to_string(),
            dev_session: "sess".to_string(),
            device_type_flag: 1,
            cookie: crate::device::Cookie("e30=".to_string()),
            is_online: online,
            params: HashMap::new(),
            last_updated: None,
        }
    }

    async fn coordinator_with(devices: Vec<Device>) -> Arc<Coordinator> {
        let coordinator = Coordinator::new(CloudApiClient::new(crate::device::Region::Eu));
        let mut map = coordinator.devices.write().await;
        for device in devices {
            map.insert(device.endpoint_id.clone(), device);
        }
        drop(map);
        coordinator
    }

    #[tokio::test]
    async fn find_device_matches_exact_id_first() {
        let coordinator =
            coordinator_with(vec![sample_device("d1", "Living Room AC", true)]).await;
        let found = coordinator.find_device("d1").await.unwrap();
        assert_eq!(found.endpoint_id, "d1");
    }

    #[tokio::test]
    async fn find_device_falls_back_to_name_substring() {
        let coordinator =
            coordinator_with(vec![sample_device("d1", "Living Room AC", true)]).await;
        let found = coordinator.find_device("living room").await.unwrap();
        assert_eq!(found.endpoint_id, "d1");
    }

    #[tokio::test]
    async fn find_device_errors_when_nothing_matches() {
        let coordinator = coordinator_with(vec![]).await;
        let err = coordinator.find_device("missing").await.unwrap_err();
        assert!(matches!(err, ClimateHubError::DeviceNotFound { .. }));
    }

    #[tokio::test]
    async fn execute_control_rejects_offline_device() {
        let coordinator =
            coordinator_with(vec![sample_device("d1", "Living Room AC", false)]).await;
        let err = coordinator.set_power("d1", true).await.unwrap_err();
        assert!(matches!(err, ClimateHubError::DeviceOffline { .. }));
    }

    #[tokio::test]
    async fn set_temperature_rejects_out_of_range_value() {
        let coordinator =
            coordinator_with(vec![sample_device("d1", "Living Room AC", true)]).await;
        let err = coordinator.set_temperature("d1", 40.0).await.unwrap_err();
        assert!(matches!(err, ClimateHubError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn dispatch_push_message_forwards_non_push_frames_to_fanout() {
        let coordinator = coordinator_with(vec![]).await;
        let mut events = coordinator.subscribe();
        coordinator
            .dispatch_push_message(serde_json::json!({"msgtype": "promo", "data": {}}))
            .await;
        let event = events.recv().await.unwrap();
        assert!(matches!(event, HubEvent::CloudMessage { .. }));
    }

    #[tokio::test]
    async fn dispatch_push_message_without_endpoint_id_forwards_to_fanout() {
        let coordinator = coordinator_with(vec![]).await;
        let mut events = coordinator.subscribe();
        coordinator
            .dispatch_push_message(serde_json::json!({"msgtype": "push", "data": {}}))
            .await;
        let event = events.recv().await.unwrap();
        assert!(matches!(event, HubEvent::CloudMessage { .. }));
    }

    #[tokio::test]
    async fn dispatch_push_message_triggers_update_for_push_with_endpoint_id() {
        let coordinator =
            coordinator_with(vec![sample_device("d1", "Living Room AC", true)]).await;
        coordinator.start_monitor("d1".to_string()).await;
        let mut events = coordinator.subscribe();
        coordinator
            .dispatch_push_message(serde_json::json!({
                "msgtype": "push",
                "data": {"endpointId": "d1"},
            }))
            .await;
        // The push+endpointId branch triggers the device's monitor rather
        // than forwarding the frame to the fan-out as a CloudMessage.
        assert!(matches!(
            events.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
        coordinator.stop().await;
    }
}
