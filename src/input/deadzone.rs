// Dead-zone shaping for analog travel

/// Applies a dead zone to one axis of travel.
///
/// Values whose magnitude stays below `dead_zone_percent` of `max_value` are
/// treated as noise and return exactly `0.0`. Everything beyond the threshold
/// is rescaled so the threshold maps to `0.0` and `max_value` still maps to
/// `max_value`, keeping the full output range. The sign is preserved.
pub fn shape(value: f64, max_value: f64, dead_zone_percent: f64) -> f64 {
    let threshold = (dead_zone_percent / 100.0) * max_value;
    if value.abs() < threshold {
        return 0.0;
    }

    // Degenerate travel, nothing left to rescale into
    let travel = max_value - threshold;
    if travel <= 0.0 {
        return 0.0;
    }

    let adjusted = (value.abs() - threshold) / travel * max_value;
    if value > 0.0 {
        adjusted
    } else {
        -adjusted
    }
}
