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

//! Core digital-twin coordinator for a cloud-connected HVAC hub: logs in to
//! the vendor cloud API, discovers devices, keeps a live state mirror via
//! periodic polling and a real-time push relay, and dispatches validated
//! control commands back out.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod device;
pub mod error;
pub mod fanout;
pub mod logger;
pub mod protocol;
pub mod push;
pub mod validation;

pub use client::CloudApiClient;
pub use config::ClimateHubConfig;
pub use coordinator::Coordinator;
pub use device::{Device, DeviceDto, Region};
pub use error::ClimateHubError;
pub use fanout::HubEvent;
pub use push::CloudPushListener;
