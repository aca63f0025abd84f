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

//! WebSocket client for the vendor's real-time push relay.
//!
//! The relay authenticates the HTTP handshake itself (not a post-connect
//! message), so every spoofed header the HTTP client sends must also be
//! present on the WebSocket upgrade request. After connecting, the client
//! exchanges an `init`/`initk` handshake and then a `ping`/`pingk` keep-alive
//! every 10 seconds; a non-zero status on either tears down the connection
//! and triggers a reconnect.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;

use crate::protocol::constants::{self, api_base_url, websocket_base_url};

const PING_INTERVAL: Duration = Duration::from_secs(10);
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(300);

/// Real-time push listener. Clone the handle to hand out additional
/// subscriptions via [`CloudPushListener::subscribe`]; the run loop itself is
/// driven by a single call to [`CloudPushListener::run`].
#[derive(Clone)]
pub struct CloudPushListener {
    url: String,
    origin: &'static str,
    loginsession: String,
    userid: String,
    events: broadcast::Sender<Value>,
}

impl CloudPushListener {
    pub fn new(region: crate::device::Region, loginsession: String, userid: String) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            url: format!(
                "{}/appsync/apprelay/relayconnect",
                websocket_base_url(region)
            ),
            origin: api_base_url(region),
            loginsession,
            userid,
            events,
        }
    }

    /// Subscribes to parsed push messages (with `init`/`ping` housekeeping
    /// frames already filtered out).
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.events.subscribe()
    }

    fn build_request(&self) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, tokio_tungstenite::tungstenite::Error> {
        let mut request = self.url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        let fixed: &[(&str, &str)] = &[
            ("licenseId", constants::LICENSE_ID),
            ("lid", constants::LICENSE_ID),
            ("language", "en"),
            ("appVersion", constants::SPOOF_APP_VERSION),
            ("User-Agent", constants::SPOOF_USER_AGENT),
            ("system", constants::SPOOF_SYSTEM),
            ("appPlatform", constants::SPOOF_APP_PLATFORM),
            ("CompanyId", constants::COMPANY_ID),
            ("Origin", self.origin),
        ];
        for (key, value) in fixed {
            headers.insert(*key, HeaderValue::from_str(value)?);
        }
        headers.insert("loginsession", HeaderValue::from_str(&self.loginsession)?);
        headers.insert("userid", HeaderValue::from_str(&self.userid)?);
        Ok(request)
    }

    /// Runs the connect/init/ping/reconnect loop until `cancel_token` fires.
    /// Reconnects with a doubling backoff, capped at 300s, on any connection
    /// loss or authentication failure.
    pub async fn run(&self, cancel_token: CancellationToken) {
        let mut backoff = INITIAL_RECONNECT_DELAY;
        while !cancel_token.is_cancelled() {
            match self.connect_and_serve(&cancel_token, &mut backoff).await {
                Ok(()) => {
                    // Clean shutdown via cancellation, not a connection failure.
                    return;
                }
                Err(e) => {
                    warn!("push relay connection lost: {e}, reconnecting in {backoff:?}");
                    tokio::select! {
                        () = tokio::time::sleep(backoff) => {}
                        () = cancel_token.cancelled() => return,
                    }
                    backoff = (backoff * 2).min(MAX_RECONNECT_DELAY);
                }
            }
        }
    }

    /// Connects, runs the session until it drops or `cancel_token` fires, and
    /// resets `backoff` to its initial value the moment the `initk` handshake
    /// succeeds, so a connection that runs for a while before dropping
    /// reconnects quickly rather than at whatever delay it last backed off to.
    async fn connect_and_serve(
        &self,
        cancel_token: &CancellationToken,
        backoff: &mut Duration,
    ) -> anyhow::Result<()> {
        let request = self.build_request()?;
        let (mut stream, _response) = connect_async(request).await?;
        info!("push relay connection established");

        let init = json!({
            "data": {"relayrule": "share"},
            "messageid": format!("{}000", now_epoch()),
            "msgtype": "init",
            "scope": {"loginsession": self.loginsession, "userid": self.userid},
        });
        stream.send(Message::Text(init.to_string().into())).await?;

        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        ping_interval.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    let _ = stream.close(None).await;
                    return Ok(());
                }
                _ = ping_interval.tick() => {
                    let ping = json!({"messageid": format!("{}000", now_epoch()), "msgtype": "ping"});
                    stream.send(Message::Text(ping.to_string().into())).await?;
                    debug!("push relay keep-alive sent");
                }
                message = stream.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if self.handle_frame(&text)? {
                                *backoff = INITIAL_RECONNECT_DELAY;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            anyhow::bail!("server closed connection: {frame:?}");
                        }
                        Some(Ok(_)) => {} // ignore ping/pong/binary frames
                        Some(Err(e)) => anyhow::bail!("websocket error: {e}"),
                        None => anyhow::bail!("websocket stream ended"),
                    }
                }
            }
        }
    }

    /// Dispatches one received frame. Returns `true` iff this was a
    /// successful `initk`, the signal the caller uses to reset the reconnect
    /// backoff.
    fn handle_frame(&self, text: &str) -> anyhow::Result<bool> {
        let data: Value = serde_json::from_str(text)?;
        let status = data.get("status").and_then(Value::as_i64).unwrap_or(-1);
        let msgtype = data.get("msgtype").and_then(Value::as_str);

        if status != 0 && matches!(msgtype, Some("initk") | Some("pingk")) {
            anyhow::bail!("relay rejected {msgtype:?} with status {status}");
        }
        match msgtype {
            Some("initk") => {
                info!("push relay session initialized");
                return Ok(true);
            }
            Some("pingk") => {
                debug!("push relay keep-alive acknowledged");
            }
            _ => {
                debug!("push relay message received");
                if self.events.send(data).is_err() {
                    // No subscribers currently listening; not an error.
                }
            }
        }
        Ok(false)
    }
}

fn now_epoch() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener() -> CloudPushListener {
        CloudPushListener::new(crate::device::Region::Eu, "session".into(), "user-1".into())
    }

    #[test]
    fn build_request_carries_spoofed_headers() {
        let listener = listener();
        let request = listener.build_request().unwrap();
        let headers = request.headers();
        assert_eq!(headers.get("userid").unwrap(), "user-1");
        assert_eq!(headers.get("loginsession").unwrap(), "session");
        assert_eq!(headers.get("lid").unwrap(), constants::LICENSE_ID);
        assert_eq!(headers.get("CompanyId").unwrap(), constants::COMPANY_ID);
        assert_eq!(headers.get("Origin").unwrap(), listener.origin);
    }

    #[test]
    fn handle_frame_rejects_nonzero_initk_status() {
        let listener = listener();
        let frame = json!({"msgtype": "initk", "status": 1}).to_string();
        assert!(listener.handle_frame(&frame).is_err());
    }

    #[test]
    fn handle_frame_accepts_successful_initk() {
        let listener = listener();
        let frame = json!({"msgtype": "initk", "status": 0}).to_string();
        assert!(listener.handle_frame(&frame).unwrap());
    }

    #[test]
    fn handle_frame_broadcasts_data_messages() {
        let listener = listener();
        let mut subscriber = listener.subscribe();
        let frame = json!({"msgtype": "push", "status": 0, "did": "d1"}).to_string();
        assert!(!listener.handle_frame(&frame).unwrap());
        let received = subscriber.try_recv().unwrap();
        assert_eq!(received["did"], "d1");
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut backoff = INITIAL_RECONNECT_DELAY;
        for _ in 0..10 {
            backoff = (backoff * 2).min(MAX_RECONNECT_DELAY);
        }
        assert_eq!(backoff, MAX_RECONNECT_DELAY);
    }
}
