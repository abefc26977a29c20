//! Unit conversion utilities
//!
//! Converts between the physical units used to describe a rover (metres,
//! metres per second, floating point gains) and the integer device units the
//! motor firmware expects on the wire.

use std::f64::consts::PI;

/// Scale applied to revolutions per second before transmission
pub const RPS_SCALE: f64 = 100.0;

/// Scale applied to PID gains before transmission
pub const GAIN_SCALE: f64 = 1000.0;

/// Wheel circumference in metres
pub fn wheel_circumference(wheel_diameter: f64) -> f64 {
    PI * wheel_diameter
}

/// Maximum wheel revolutions per second for a linear speed
///
/// `max_rps = max_linear_speed / (π × wheel_diameter)`
pub fn max_revolutions_per_second(max_linear_speed: f64, wheel_diameter: f64) -> f64 {
    max_linear_speed / wheel_circumference(wheel_diameter)
}

/// Revolutions per second as transmitted: `round(100 × rps)`
pub fn rps_to_device(rps: f64) -> i32 {
    (RPS_SCALE * rps).round() as i32
}

/// PID gain as transmitted: `round(1000 × gain)`
pub fn gain_to_device(gain: f64) -> i32 {
    (GAIN_SCALE * gain).round() as i32
}

/// Inverse of [`gain_to_device`], for reading gains back from diagnostics
pub fn gain_from_device(value: i32) -> f64 {
    value as f64 / GAIN_SCALE
}

/// Encoder steps per second at the given revolution rate
pub fn encoder_steps_per_second(rps: f64, encoder_steps: f64) -> f64 {
    rps * encoder_steps
}

/// Wheel speed as a fraction of the maximum speed
///
/// * `delta_steps` - Encoder steps counted during the interval
/// * `dt_ms` - Interval length in milliseconds
/// * `encoder_steps` - Steps per wheel revolution
/// * `max_rps` - Maximum revolutions per second
///
/// Returns 0.0 for a non-positive interval.
pub fn relative_speed(delta_steps: f64, dt_ms: f64, encoder_steps: f64, max_rps: f64) -> f64 {
    if dt_ms <= 0.0 || encoder_steps <= 0.0 || max_rps <= 0.0 {
        return 0.0;
    }
    1000.0 * delta_steps / dt_ms / encoder_steps / max_rps
}

/// Distance in metres travelled by a wheel for an encoder delta
pub fn wheel_distance(delta_steps: f64, wheel_diameter: f64, encoder_steps: f64) -> f64 {
    if encoder_steps <= 0.0 {
        return 0.0;
    }
    wheel_circumference(wheel_diameter) * delta_steps / encoder_steps
}
