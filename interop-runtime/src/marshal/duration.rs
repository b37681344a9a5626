//! Durations as native scalars.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::marshal::scalar::Scalar;

/// How a [`Duration`] is represented on the native side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationMapping {
    /// Whole milliseconds as `u64`.
    Milliseconds,
    /// Whole seconds as `u64`.
    Seconds,
    /// Fractional seconds as `f32`.
    SecondsFloat,
}

impl DurationMapping {
    /// Convert to the native scalar. Integer forms truncate and saturate at `u64::MAX`.
    pub fn to_native(self, value: Duration) -> Scalar {
        match self {
            DurationMapping::Milliseconds => {
                Scalar::U64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
            }
            DurationMapping::Seconds => Scalar::U64(value.as_secs()),
            DurationMapping::SecondsFloat => Scalar::F32(value.as_secs_f32()),
        }
    }

    /// Convert from the native scalar.
    ///
    /// Fails on a scalar of the wrong kind or on a negative, NaN, or
    /// overflowing float.
    pub fn from_native(self, value: Scalar) -> Result<Duration> {
        match (self, value) {
            (DurationMapping::Milliseconds, Scalar::U64(ms)) => Ok(Duration::from_millis(ms)),
            (DurationMapping::Seconds, Scalar::U64(s)) => Ok(Duration::from_secs(s)),
            (DurationMapping::SecondsFloat, Scalar::F32(s)) => Duration::try_from_secs_f32(s)
                .map_err(|e| Error::InvalidDuration(format!("{s} seconds: {e}"))),
            (mapping, other) => Err(Error::ProtocolViolation(format!(
                "{mapping:?} duration carried as {}",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip() {
        let d = Duration::from_millis(4200);
        let native = DurationMapping::Milliseconds.to_native(d);
        assert_eq!(native, Scalar::U64(4200));
        assert_eq!(DurationMapping::Milliseconds.from_native(native).unwrap(), d);
    }

    #[test]
    fn seconds_truncate() {
        let native = DurationMapping::Seconds.to_native(Duration::from_millis(2999));
        assert_eq!(native, Scalar::U64(2));
    }

    #[test]
    fn float_seconds() {
        let native = DurationMapping::SecondsFloat.to_native(Duration::from_millis(1500));
        assert_eq!(native, Scalar::F32(1.5));
        assert_eq!(
            DurationMapping::SecondsFloat.from_native(native).unwrap(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn negative_float_rejected() {
        let err = DurationMapping::SecondsFloat
            .from_native(Scalar::F32(-1.0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDuration(_)));
    }

    #[test]
    fn wrong_kind_is_protocol_violation() {
        let err = DurationMapping::Seconds
            .from_native(Scalar::U32(5))
            .unwrap_err();
        assert!(err.is_protocol_violation());
    }
}
