use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Easing curve applied to the in/out transitions of a hit-slow.
///
/// Every curve is monotonic over [0, 1] and pinned at the endpoints:
/// `apply(0.0) == 0.0` and `apply(1.0) == 1.0`. Inputs outside the unit
/// range are clamped before evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum EaseKind {
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    #[default]
    InOutCubic,
    InSine,
    OutSine,
    InOutSine,
    InExpo,
    OutExpo,
    InOutExpo,
}

impl EaseKind {
    pub const ALL: [EaseKind; 13] = [
        Self::Linear,
        Self::InQuad,
        Self::OutQuad,
        Self::InOutQuad,
        Self::InCubic,
        Self::OutCubic,
        Self::InOutCubic,
        Self::InSine,
        Self::OutSine,
        Self::InOutSine,
        Self::InExpo,
        Self::OutExpo,
        Self::InOutExpo,
    ];

    /// Evaluate the curve at `t`.
    pub fn apply(self, t: f64) -> f64 {
        if t.is_nan() || t <= 0.0 {
            return 0.0;
        }
        if t >= 1.0 {
            return 1.0;
        }
        match self {
            Self::Linear => t,
            Self::InQuad => t * t,
            Self::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Self::InCubic => t * t * t,
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Self::InSine => 1.0 - (t * PI / 2.0).cos(),
            Self::OutSine => (t * PI / 2.0).sin(),
            Self::InOutSine => -((PI * t).cos() - 1.0) / 2.0,
            Self::InExpo => 2f64.powf(10.0 * t - 10.0),
            Self::OutExpo => 1.0 - 2f64.powf(-10.0 * t),
            Self::InOutExpo => {
                if t < 0.5 {
                    2f64.powf(20.0 * t - 10.0) / 2.0
                } else {
                    (2.0 - 2f64.powf(-20.0 * t + 10.0)) / 2.0
                }
            }
        }
    }
}

/// Linear interpolation between `a` and `b`.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn endpoints_are_exact() {
        for kind in EaseKind::ALL {
            assert_eq!(kind.apply(0.0), 0.0, "{kind:?} at 0");
            assert_eq!(kind.apply(1.0), 1.0, "{kind:?} at 1");
        }
    }

    #[test]
    fn out_of_range_input_is_clamped() {
        for kind in EaseKind::ALL {
            assert_eq!(kind.apply(-0.5), 0.0);
            assert_eq!(kind.apply(7.0), 1.0);
            assert_eq!(kind.apply(f64::NAN), 0.0);
        }
    }

    #[test]
    fn in_out_curves_pass_through_half() {
        for kind in [
            EaseKind::Linear,
            EaseKind::InOutQuad,
            EaseKind::InOutCubic,
            EaseKind::InOutSine,
            EaseKind::InOutExpo,
        ] {
            assert!((kind.apply(0.5) - 0.5).abs() < 1e-9, "{kind:?}");
        }
    }

    #[test]
    fn ease_kind_serde() {
        let json = serde_json::to_string(&EaseKind::InOutCubic).unwrap();
        assert_eq!(json, "\"inOutCubic\"");
        let back: EaseKind = serde_json::from_str("\"outExpo\"").unwrap();
        assert_eq!(back, EaseKind::OutExpo);
    }

    #[test]
    fn lerp_hits_both_ends() {
        assert_eq!(lerp(1.0, 0.1, 0.0), 1.0);
        assert!((lerp(1.0, 0.1, 1.0) - 0.1).abs() < 1e-12);
        assert!((lerp(0.0, 1.0, 0.25) - 0.25).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn curves_are_monotonic_and_bounded(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            for kind in EaseKind::ALL {
                let y_lo = kind.apply(lo);
                let y_hi = kind.apply(hi);
                prop_assert!((0.0..=1.0).contains(&y_lo));
                prop_assert!((0.0..=1.0).contains(&y_hi));
                prop_assert!(y_lo <= y_hi + 1e-12, "{:?} not monotonic at {} / {}", kind, lo, hi);
            }
        }
    }
}
