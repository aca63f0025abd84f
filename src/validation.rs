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

//! Pure validation helpers for control requests. Every function here either
//! returns the vendor-encoded value or a `ClimateHubError::InvalidParameter`
//! naming the accepted set, so the coordinator never has to build that
//! message itself.

use crate::device::{FanSpeed, Mode, SwingAxis};
use crate::error::ClimateHubError;
use crate::protocol::constants::{AC_FAN_SPEED, AC_SWING_HORIZONTAL, AC_SWING_VERTICAL, AUX_MODE};

pub const MIN_TEMPERATURE_C: f64 = 16.0;
pub const MAX_TEMPERATURE_C: f64 = 30.0;

pub fn validate_temperature(celsius: f64) -> Result<(), ClimateHubError> {
    if (MIN_TEMPERATURE_C..=MAX_TEMPERATURE_C).contains(&celsius) {
        Ok(())
    } else {
        Err(ClimateHubError::invalid_parameter(
            "temperature",
            celsius,
            &[&format!("{MIN_TEMPERATURE_C}-{MAX_TEMPERATURE_C}\u{b0}C")],
        ))
    }
}

pub fn celsius_to_api(celsius: f64) -> i64 {
    (celsius * 10.0).round() as i64
}

pub fn api_to_celsius(api_temp: i64) -> f64 {
    api_temp as f64 / 10.0
}

pub fn validate_mode(mode: &str) -> Result<Mode, ClimateHubError> {
    match mode.to_lowercase().as_str() {
        "cool" => Ok(Mode::Cool),
        "heat" => Ok(Mode::Heat),
        "dry" => Ok(Mode::Dry),
        "fan" => Ok(Mode::Fan),
        "auto" => Ok(Mode::Auto),
        _ => Err(ClimateHubError::invalid_parameter(
            "mode",
            mode,
            &["cool", "heat", "dry", "fan", "auto"],
        )),
    }
}

/// The single-entry `{ac_mode: value}` param map a validated mode produces.
pub fn mode_param(mode: Mode) -> (&'static str, i64) {
    (AUX_MODE, mode as i64)
}

pub fn validate_fan_speed(speed: &str) -> Result<FanSpeed, ClimateHubError> {
    match speed.to_lowercase().as_str() {
        "auto" => Ok(FanSpeed::Auto),
        "low" => Ok(FanSpeed::Low),
        "medium" => Ok(FanSpeed::Medium),
        "high" => Ok(FanSpeed::High),
        "turbo" => Ok(FanSpeed::Turbo),
        "mute" => Ok(FanSpeed::Mute),
        _ => Err(ClimateHubError::invalid_parameter(
            "fan_speed",
            speed,
            &["auto", "low", "medium", "high", "turbo", "mute"],
        )),
    }
}

pub fn fan_speed_param(speed: FanSpeed) -> (&'static str, i64) {
    (AC_FAN_SPEED, speed as i64)
}

pub fn validate_swing_direction(direction: &str) -> Result<SwingAxis, ClimateHubError> {
    match direction.to_lowercase().as_str() {
        "vertical" => Ok(SwingAxis::Vertical),
        "horizontal" => Ok(SwingAxis::Horizontal),
        _ => Err(ClimateHubError::invalid_parameter(
            "swing_direction",
            direction,
            &["vertical", "horizontal"],
        )),
    }
}

pub fn swing_param(axis: SwingAxis, on: bool) -> (&'static str, i64) {
    let name = match axis {
        SwingAxis::Vertical => AC_SWING_VERTICAL,
        SwingAxis::Horizontal => AC_SWING_HORIZONTAL,
    };
    (name, i64::from(on))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_range_is_inclusive() {
        assert!(validate_temperature(16.0).is_ok());
        assert!(validate_temperature(30.0).is_ok());
        assert!(validate_temperature(15.5).is_err());
        assert!(validate_temperature(30.5).is_err());
    }

    #[test]
    fn celsius_conversion_round_trips() {
        assert_eq!(celsius_to_api(22.0), 220);
        assert_eq!(api_to_celsius(220), 22.0);
    }

    #[test]
    fn mode_is_case_insensitive() {
        assert_eq!(validate_mode("COOL").unwrap(), Mode::Cool);
        assert!(validate_mode("warm").is_err());
    }

    #[test]
    fn fan_speed_rejects_unknown_value() {
        let err = validate_fan_speed("ludicrous").unwrap_err();
        assert!(matches!(err, ClimateHubError::InvalidParameter { .. }));
    }

    #[test]
    fn swing_param_encodes_axis_and_state() {
        assert_eq!(swing_param(SwingAxis::Vertical, true), ("ac_vdir", 1));
        assert_eq!(swing_param(SwingAxis::Horizontal, false), ("ac_hdir", 0));
    }
}
