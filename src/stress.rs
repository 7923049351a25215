//! Sampling of raw stresses from a stress table.

use std::fmt;
use std::str::FromStr;

use log::warn;

use crate::error::Result;
use crate::store::Store;

/// The stress components held for each load case of a stress table.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StressRow {
    pub x: f64,
    pub y: f64,
    pub xy: f64,
}

/// Which stress is extracted from a stress table row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StressComponent {
    NormalX,
    NormalY,
    ShearXY,
    /// Plane stress rotated by an angle in radians.
    Rotated(f64),
}

impl StressComponent {
    pub fn sample(&self, row: &StressRow) -> f64 {
        match *self {
            StressComponent::NormalX => row.x,
            StressComponent::NormalY => row.y,
            StressComponent::ShearXY => row.xy,
            StressComponent::Rotated(angle) => rotate(row, angle),
        }
    }
}

impl Default for StressComponent {
    fn default() -> Self {
        StressComponent::NormalX
    }
}

/// Plane stress transformation of a stress table row.
pub fn rotate(row: &StressRow, angle: f64) -> f64 {
    0.5 * (row.x + row.y) + 0.5 * (row.x - row.y) * (2.0 * angle).cos() + row.xy * (2.0 * angle).sin()
}

/// The contributions summed into each peak of a sigma file. Each one
/// carries its own set of correction factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StressType {
    OneG,
    Increment,
    DeltaP,
    DeltaT,
}

impl StressType {
    pub const ALL: [StressType; 4] = [
        StressType::OneG,
        StressType::Increment,
        StressType::DeltaP,
        StressType::DeltaT,
    ];

    pub fn text(&self) -> &'static str {
        match *self {
            StressType::OneG => "oneg",
            StressType::Increment => "increment",
            StressType::DeltaP => "deltap",
            StressType::DeltaT => "deltat",
        }
    }

    pub fn from_text(input: &str) -> Option<StressType> {
        match input {
            "oneg" | "1g" => Some(StressType::OneG),
            "increment" | "inc" => Some(StressType::Increment),
            "deltap" | "dp" => Some(StressType::DeltaP),
            "deltat" | "dt" => Some(StressType::DeltaT),
            _ => None,
        }
    }
}

impl fmt::Display for StressType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

impl FromStr for StressType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        StressType::from_text(&s.to_lowercase()).ok_or_else(|| format!("unknown stress type '{}'", s))
    }
}

/// Reads stresses of one stress table for a fixed component.
pub struct StressSampler<'a> {
    store: &'a dyn Store,
    stf_id: i64,
    component: StressComponent,
}

impl<'a> StressSampler<'a> {
    pub fn new(store: &'a dyn Store, stf_id: i64, component: StressComponent) -> Self {
        Self {
            store,
            stf_id,
            component,
        }
    }

    /// Stress for an issy code. A code missing from the table gives zero.
    pub fn sample(&self, issy_code: &str) -> Result<f64> {
        match self.store.stf_stress(self.stf_id, issy_code)? {
            Some(row) => Ok(self.component.sample(&row)),
            None => {
                warn!("No stress found for load case '{}' in stress table {}, using 0.0", issy_code, self.stf_id);
                Ok(0.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn row() -> StressRow {
        StressRow {
            x: 100.0,
            y: 50.0,
            xy: 20.0,
        }
    }

    #[test]
    fn rotated_by_zero_gives_normal_x() {
        assert!((StressComponent::Rotated(0.0).sample(&row()) - 100.0).abs() <= f64::EPSILON);
    }

    #[test]
    fn rotated_by_right_angle_gives_normal_y() {
        assert!((StressComponent::Rotated(PI / 2.0).sample(&row()) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rotated_by_quarter_pi_adds_shear() {
        // cos(pi/2) = 0 and sin(pi/2) = 1
        let expected = 0.5 * (100.0 + 50.0) + 20.0;
        assert!((StressComponent::Rotated(PI / 4.0).sample(&row()) - expected).abs() < 1e-9);
    }

    #[test]
    fn rotated_matches_closed_form() {
        let cases: [(f64, f64, f64, f64); 3] = [
            (10.0, -4.0, 3.0, 0.3),
            (-25.0, 80.0, -12.5, 1.1),
            (0.0, 0.0, 7.0, 2.5),
        ];
        for &(x, y, xy, theta) in cases.iter() {
            let row = StressRow { x, y, xy };
            let expected = 0.5 * (x + y) + 0.5 * (x - y) * (2.0 * theta).cos() + xy * (2.0 * theta).sin();
            assert!((rotate(&row, theta) - expected).abs() <= f64::EPSILON * 100.0);
        }
    }

    #[test]
    fn plain_components_are_read_directly() {
        assert!((StressComponent::NormalX.sample(&row()) - 100.0).abs() <= f64::EPSILON);
        assert!((StressComponent::NormalY.sample(&row()) - 50.0).abs() <= f64::EPSILON);
        assert!((StressComponent::ShearXY.sample(&row()) - 20.0).abs() <= f64::EPSILON);
    }

    #[test]
    fn stress_type_text_round_trips() {
        for stress_type in StressType::ALL.iter() {
            assert_eq!(StressType::from_text(stress_type.text()), Some(*stress_type));
        }
        assert_eq!("DeltaP".parse::<StressType>(), Ok(StressType::DeltaP));
        assert!("shear".parse::<StressType>().is_err());
    }
}
