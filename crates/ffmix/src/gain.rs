//! Gain math for the monitor mixers
//!
//! Pure conversions between the user-facing fader model (volume in dB, pan,
//! mute, dimmer) and the device's raw gain registers, plus meter calibration.
//! No I/O, no state; everything here is unit-testable standalone.

/// Value pushed to meter widgets when a channel is silent or offline.
pub const SILENCE_DB: f64 = -138.0;

/// Meter readings below this are clamped to the silence floor.
pub const NOISE_FLOOR_DB: f64 = -78.0;

/// Full-scale raw meter value reported by the device.
pub const METER_FULL_SCALE: f64 = 134_217_712.0;

/// Fader range of the monitor mixers, in dB.
pub const MONITOR_RANGE_DB: (f64, f64) = (-65.0, 6.0);

/// Raw register range of the monitor mixer source gains.
pub const MONITOR_RANGE_RAW: (i64, i64) = (32768, 40960);

/// Convert a fader position to a left/right pair of raw device gains.
///
/// Mute, an inactive dimmer, or a volume at or below the input floor all
/// collapse to the output floor on both sides. Otherwise the dimmer offset
/// is applied, the result clamped into `in_range`, converted to a linear
/// coefficient, panned, and affine-mapped into `out_range`.
///
/// Panning is constant-attenuation: the weaker side is scaled down linearly,
/// the stronger side stays at unity. `pan` is clamped to [0, 1]; 0.5 leaves
/// both sides untouched.
pub fn volume_pan_to_gains(
    volume_db: f64,
    pan: f64,
    mute: bool,
    in_range: (f64, f64),
    out_range: (i64, i64),
    dimmer_db: f64,
) -> (i64, i64) {
    if mute || dimmer_db <= in_range.0 || volume_db <= in_range.0 {
        return (out_range.0, out_range.0);
    }

    let v = (volume_db + dimmer_db).clamp(in_range.0, in_range.1);

    // dB to linear coefficient, 6 dB of headroom above unity
    let mut left = 10f64.powf((v - 6.0) / 20.0);
    let mut right = left;

    let pan = pan.clamp(0.0, 1.0);
    if pan < 0.5 {
        right *= pan * 2.0;
    } else if pan > 0.5 {
        left *= 2.0 - 2.0 * pan;
    }

    let span = (out_range.1 - out_range.0) as f64;
    let left = (left * span) as i64 + out_range.0;
    let right = (right * span) as i64 + out_range.0;

    (left, right)
}

/// Fader conversion with the monitor mixer's fixed ranges.
pub fn monitor_gains(volume_db: f64, pan: f64, mute: bool, dimmer_db: f64) -> (i64, i64) {
    volume_pan_to_gains(volume_db, pan, mute, MONITOR_RANGE_DB, MONITOR_RANGE_RAW, dimmer_db)
}

/// Convert a raw meter sample to calibrated dBFS.
///
/// Zero maps straight to the silence floor. Everything else is converted
/// against full scale, rounded to one decimal, and clamped to the silence
/// floor below the noise-floor threshold so idle channels read as silent.
pub fn meter_raw_to_db(raw: i64) -> f64 {
    if raw == 0 {
        return SILENCE_DB;
    }
    let db = 20.0 * (raw as f64 / METER_FULL_SCALE).log10();
    let db = (db * 10.0).round() / 10.0;
    if db < NOISE_FLOOR_DB {
        SILENCE_DB
    } else {
        db
    }
}
