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

//! Runtime configuration. Unlike the on-disk TOML settings store this was
//! adapted from, a climate hub has no per-device persisted tuning to survive
//! restarts across driver reloads, so configuration here is a flat, directly
//! constructed struct sourced from CLI args and environment variables rather
//! than a file on disk.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordinator::{DEFAULT_DISCOVERY_INTERVAL, DEFAULT_MONITOR_INTERVAL};
use crate::device::Region;
use crate::error::ClimateHubError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimateHubConfig {
    pub region: Region,
    pub email: String,
    pub password: String,
    #[serde(with = "duration_secs")]
    pub discovery_interval: Duration,
    #[serde(with = "duration_secs")]
    pub monitor_interval: Duration,
    pub debug: bool,
}

impl ClimateHubConfig {
    pub fn new(region: Region, email: String, password: String) -> Self {
        Self {
            region,
            email,
            password,
            discovery_interval: DEFAULT_DISCOVERY_INTERVAL,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            debug: false,
        }
    }

    pub fn with_discovery_interval_secs(mut self, secs: u64) -> Result<Self, ClimateHubError> {
        if secs == 0 {
            return Err(ClimateHubError::invalid_parameter(
                "discovery_interval_secs",
                secs,
                &["a positive number of seconds"],
            ));
        }
        self.discovery_interval = Duration::from_secs(secs);
        Ok(self)
    }

    pub fn with_monitor_interval_secs(mut self, secs: u64) -> Result<Self, ClimateHubError> {
        if secs == 0 {
            return Err(ClimateHubError::invalid_parameter(
                "monitor_interval_secs",
                secs,
                &["a positive number of seconds"],
            ));
        }
        self.monitor_interval = Duration::from_secs(secs);
        Ok(self)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_discovery_interval_is_rejected() {
        let config = ClimateHubConfig::new(Region::Eu, "a@b.com".into(), "pw".into());
        assert!(config.with_discovery_interval_secs(0).is_err());
    }

    #[test]
    fn positive_intervals_are_applied() {
        let config = ClimateHubConfig::new(Region::Eu, "a@b.com".into(), "pw".into())
            .with_monitor_interval_secs(30)
            .unwrap();
        assert_eq!(config.monitor_interval, Duration::from_secs(30));
    }
}
