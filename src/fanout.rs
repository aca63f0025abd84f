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

//! Broadcasts device-state changes to any number of subscribers (an external
//! HTTP/WebSocket facade, typically). A slow or gone subscriber never blocks
//! another: `tokio::sync::broadcast` drops frames for lagging receivers
//! rather than waiting on them, the same tolerant-broadcast shape as a
//! connection manager that prunes dead clients after every send.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::device::DeviceDto;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    DeviceUpdate { device: DeviceDto },
    InitialState { devices: Vec<DeviceDto> },
    /// A push-relay frame that wasn't a device-refresh trigger, forwarded
    /// verbatim per spec §4.4's dispatch rule.
    CloudMessage { message: Value },
}

/// Subscriber registry for device-state events.
#[derive(Clone)]
pub struct Fanout {
    sender: broadcast::Sender<HubEvent>,
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new()
    }
}

impl Fanout {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribes to future events. Pair with a snapshot of current device
    /// state (from the coordinator) sent as an `InitialState` event so a
    /// newly connected client is never missing the devices that existed
    /// before it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.sender.subscribe()
    }

    /// Notifies all current subscribers of a single device's new state.
    /// Silently drops the event if nobody is listening; that is the normal
    /// state between client connections, not a failure.
    pub fn notify_update(&self, device: &DeviceDto) {
        let _ = self.sender.send(HubEvent::DeviceUpdate {
            device: device.clone(),
        });
    }

    /// Forwards a push-relay message that wasn't dispatched as a device
    /// refresh trigger, unchanged, to all current subscribers.
    pub fn notify_cloud_message(&self, message: Value) {
        let _ = self.sender.send(HubEvent::CloudMessage { message });
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_dto() -> DeviceDto {
        DeviceDto {
            endpoint_id: "d1".into(),
            friendly_name: "Living Room AC".into(),
            is_online: true,
            state: 1,
            params: HashMap::new(),
            last_updated: None,
            target_temperature: Some(22.0),
            ambient_temperature: Some(26.0),
            mode: Some("Cool".into()),
            fan_speed: Some("Auto".into()),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_update() {
        let fanout = Fanout::new();
        let mut receiver = fanout.subscribe();
        fanout.notify_update(&sample_dto());
        let event = receiver.recv().await.unwrap();
        match event {
            HubEvent::DeviceUpdate { device } => assert_eq!(device.endpoint_id, "d1"),
            _ => panic!("expected a DeviceUpdate event"),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_cloud_message_unchanged() {
        let fanout = Fanout::new();
        let mut receiver = fanout.subscribe();
        fanout.notify_cloud_message(serde_json::json!({"msgtype": "promo"}));
        let event = receiver.recv().await.unwrap();
        match event {
            HubEvent::CloudMessage { message } => assert_eq!(message["msgtype"], "promo"),
            _ => panic!("expected a CloudMessage event"),
        }
    }

    #[test]
    fn notify_without_subscribers_does_not_panic() {
        let fanout = Fanout::new();
        fanout.notify_update(&sample_dto());
        assert_eq!(fanout.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_count_tracks_active_subscriptions() {
        let fanout = Fanout::new();
        let _a = fanout.subscribe();
        let _b = fanout.subscribe();
        assert_eq!(fanout.subscriber_count(), 2);
    }
}
