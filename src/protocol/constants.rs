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

//! Fixed values the vendor's API/relay require. Ported from the vendor SDK's
//! own constants; these are not ours to choose.

use crate::device::Region;

pub const API_SERVER_URL_EU: &str = "https://app-service-deu-f0e9ebbb.smarthomecs.de";
pub const API_SERVER_URL_USA: &str = "https://app-service-usa-fd7cc04c.smarthomecs.com";
pub const API_SERVER_URL_CN: &str = "https://app-service-chn-31a93883.ibroadlink.com";

pub const WEBSOCKET_SERVER_URL_EU: &str = "wss://app-relay-deu-f0e9ebbb.smarthomecs.de";
pub const WEBSOCKET_SERVER_URL_USA: &str = "wss://app-relay-usa-fd7cc04c.smarthomecs.com";
pub const WEBSOCKET_SERVER_URL_CN: &str = "wss://app-relay-chn-31a93883.ibroadlink.com";

pub const TIMESTAMP_TOKEN_ENCRYPT_KEY: &str = "kdixkdqp54545^#*";
pub const PASSWORD_ENCRYPT_KEY: &str = "4969fj#k23#";
pub const BODY_ENCRYPT_KEY: &str = "xgx3d*fe3478$ukx";

/// The vendor's fixed AES IV, as signed bytes wrapped to `u8`.
pub const AES_INITIAL_VECTOR: [u8; 16] = [
    234, 170, 170, 58, 187, 88, 98, 162, 25, 24, 181, 119, 29, 22, 21, 170,
];

pub const LICENSE: &str = "PAFbJJ3WbvDxH5vvWezXN5BujETtH/iuTtIIW5CE/SeHN7oNKqnEajgljTcL0fBQQWM0XAAAAAAnBhJyhMi7zIQMsUcwR/PEwGA3uB5HLOnr+xRrci+FwHMkUtK7v4yo0ZHa+jPvb6djelPP893k7SagmffZmOkLSOsbNs8CAqsu8HuIDs2mDQAAAAA=";
pub const LICENSE_ID: &str = "3c015b249dd66ef0f11f9bef59ecd737";
pub const COMPANY_ID: &str = "48eb1b36cf0202ab2ef07b880ecda60d";

pub const SPOOF_APP_VERSION: &str = "2.2.10.456537160";
pub const SPOOF_USER_AGENT: &str = "Dalvik/2.1.0 (Linux; U; Android 12; SM-G991B Build/SP1A.210812.016)";
pub const SPOOF_SYSTEM: &str = "android";
pub const SPOOF_APP_PLATFORM: &str = "android";

// Parameter name constants (`ac_*`/`hp_*` keys the vendor's control API uses).
pub const AUX_MODE: &str = "ac_mode";
pub const AC_POWER: &str = "pwr";
pub const AC_TEMPERATURE_TARGET: &str = "temp";
pub const AC_TEMPERATURE_AMBIENT: &str = "envtemp";
pub const AC_FAN_SPEED: &str = "ac_mark";
pub const AC_SWING_VERTICAL: &str = "ac_vdir";
pub const AC_SWING_HORIZONTAL: &str = "ac_hdir";
pub const HP_WATER_TANK_TEMPERATURE: &str = "hp_water_tank_temp";

pub fn api_base_url(region: Region) -> &'static str {
    match region {
        Region::Eu => API_SERVER_URL_EU,
        Region::Usa => API_SERVER_URL_USA,
        Region::Cn => API_SERVER_URL_CN,
    }
}

pub fn websocket_base_url(region: Region) -> &'static str {
    match region {
        Region::Eu => WEBSOCKET_SERVER_URL_EU,
        Region::Usa => WEBSOCKET_SERVER_URL_USA,
        Region::Cn => WEBSOCKET_SERVER_URL_CN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_iv_matches_vendor_constant() {
        // The vendor source expresses this IV as signed i8 bytes wrapped mod 256.
        let signed: [i32; 16] = [
            -22, -86, -86, 58, -69, 88, 98, -94, 25, 24, -75, 119, 29, 22, 21, -86,
        ];
        let expected: Vec<u8> = signed.iter().map(|b| (b.rem_euclid(256)) as u8).collect();
        assert_eq!(AES_INITIAL_VECTOR.to_vec(), expected);
    }

    #[test]
    fn region_selects_matching_api_and_ws_host() {
        assert!(api_base_url(Region::Eu).contains("deu"));
        assert!(websocket_base_url(Region::Eu).contains("deu"));
        assert!(api_base_url(Region::Usa).contains("usa"));
        assert!(api_base_url(Region::Cn).contains("chn"));
    }
}
