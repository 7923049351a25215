//! Correction of sampled stresses.
//!
//! A raw stress is corrected in three passes which always run in the same
//! order: the overall factor of its stress type, then the first segment
//! factor matching its segment, then the first load case factor matching
//! its issy code.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::stress::StressType;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
    Multiply,
    Add,
    Set,
}

impl Method {
    pub fn apply(&self, value: f64, operand: f64) -> f64 {
        match *self {
            Method::Multiply => value * operand,
            Method::Add => value + operand,
            Method::Set => operand,
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "multiply" | "mul" | "*" => Ok(Method::Multiply),
            "add" | "+" => Ok(Method::Add),
            "set" | "=" => Ok(Method::Set),
            other => Err(format!("unknown modification method '{}'", other)),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match *self {
            Method::Multiply => "multiply",
            Method::Add => "add",
            Method::Set => "set",
        };
        write!(f, "{}", text)
    }
}

/// A method together with its operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modifier {
    pub method: Method,
    pub value: f64,
}

impl Modifier {
    pub fn new(method: Method, value: f64) -> Self {
        Self { method, value }
    }

    pub fn apply(&self, stress: f64) -> f64 {
        self.method.apply(stress, self.value)
    }
}

impl Default for Modifier {
    /// Leaves the stress unchanged.
    fn default() -> Self {
        Self::new(Method::Multiply, 1.0)
    }
}

/// Parses `method:value`, e.g. `multiply:1.5` or `set:0`.
impl FromStr for Modifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.split(':').collect::<Vec<_>>();
        if parts.len() != 2 {
            return Err(format!("expected 'method:value' but found '{}'", s));
        }
        let method = parts[0].parse::<Method>()?;
        let value = parts[1]
            .trim()
            .parse::<f64>()
            .map_err(|why| format!("invalid modifier value '{}': {}", parts[1], why))?;
        Ok(Modifier::new(method, value))
    }
}

/// A structural region used to scope segment factors. Two segments are
/// the same when both the name and the order agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    pub name: String,
    pub order: i64,
}

impl Segment {
    pub fn new(name: &str, order: i64) -> Self {
        Self {
            name: name.to_string(),
            order,
        }
    }

    /// Segment of a 1g flight phase, e.g. `CRUISE_1G_A` is segment `CRUISE`.
    pub fn from_flight_phase(flight_phase: &str, order: i64) -> Self {
        Self::new(extract_segment_name(flight_phase), order)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.order)
    }
}

pub fn extract_segment_name(flight_phase: &str) -> &str {
    let phase = flight_phase.trim();
    match phase.find('_') {
        Some(end) if end > 0 => &phase[..end],
        _ => phase,
    }
}

/// Per stress type modifiers applied to every stress of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverallFactors {
    modifiers: BTreeMap<StressType, Modifier>,
}

impl OverallFactors {
    pub fn set(&mut self, stress_type: StressType, modifier: Modifier) {
        self.modifiers.insert(stress_type, modifier);
    }

    pub fn get(&self, stress_type: StressType) -> Modifier {
        self.modifiers.get(&stress_type).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFactor {
    pub segment: Segment,
    pub modifiers: BTreeMap<StressType, Modifier>,
}

impl SegmentFactor {
    pub fn new(segment: Segment) -> Self {
        Self {
            segment,
            modifiers: BTreeMap::new(),
        }
    }

    pub fn with(mut self, stress_type: StressType, modifier: Modifier) -> Self {
        self.modifiers.insert(stress_type, modifier);
        self
    }

    pub fn get(&self, stress_type: StressType) -> Modifier {
        self.modifiers.get(&stress_type).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadcaseFactor {
    pub issy_code: String,
    pub modifier: Modifier,
}

impl LoadcaseFactor {
    pub fn new(issy_code: &str, modifier: Modifier) -> Self {
        Self {
            issy_code: issy_code.to_string(),
            modifier,
        }
    }
}

/// Apply the overall, segment and load case corrections to a stress.
pub fn modify(
    stress: f64,
    stress_type: StressType,
    segment: Option<&Segment>,
    overall: &OverallFactors,
    segment_factors: &[SegmentFactor],
    loadcase_factors: &[LoadcaseFactor],
    issy_code: Option<&str>,
) -> f64 {
    let keys = match issy_code {
        Some(code) => vec![code],
        None => vec![],
    };
    modify_matching(stress, stress_type, segment, overall, segment_factors, loadcase_factors, &keys)
}

/// As `modify` but the load case pass stops at the first factor matching
/// any one of `issy_codes`.
pub fn modify_matching(
    stress: f64,
    stress_type: StressType,
    segment: Option<&Segment>,
    overall: &OverallFactors,
    segment_factors: &[SegmentFactor],
    loadcase_factors: &[LoadcaseFactor],
    issy_codes: &[&str],
) -> f64 {
    let mut stress = overall.get(stress_type).apply(stress);

    if let Some(segment) = segment {
        if let Some(factor) = segment_factors.iter().find(|f| f.segment == *segment) {
            stress = factor.get(stress_type).apply(stress);
        }
    }

    if let Some(factor) = loadcase_factors
        .iter()
        .find(|f| issy_codes.iter().any(|code| f.issy_code == *code))
    {
        stress = factor.modifier.apply(stress);
    }

    stress
}

/// The complete set of corrections for a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Factors {
    pub overall: OverallFactors,
    pub segments: Vec<SegmentFactor>,
    pub loadcases: Vec<LoadcaseFactor>,
}

impl Factors {
    pub fn modify(&self, stress: f64, stress_type: StressType, segment: Option<&Segment>, issy_code: Option<&str>) -> f64 {
        modify(
            stress,
            stress_type,
            segment,
            &self.overall,
            &self.segments,
            &self.loadcases,
            issy_code,
        )
    }

    pub fn modify_matching(&self, stress: f64, stress_type: StressType, segment: Option<&Segment>, issy_codes: &[&str]) -> f64 {
        modify_matching(
            stress,
            stress_type,
            segment,
            &self.overall,
            &self.segments,
            &self.loadcases,
            issy_codes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn precedence_factors() -> Factors {
        let mut factors = Factors::default();
        factors.overall.set(StressType::OneG, Modifier::new(Method::Multiply, 2.0));
        factors.segments.push(
            SegmentFactor::new(Segment::new("S", 1)).with(StressType::OneG, Modifier::new(Method::Add, 5.0)),
        );
        factors.loadcases.push(LoadcaseFactor::new("C", Modifier::new(Method::Set, 9.0)));
        factors
    }

    #[test]
    fn corrections_run_overall_segment_then_loadcase() {
        let factors = precedence_factors();
        let segment = Segment::new("S", 1);

        let overall_only = factors.modify(10.0, StressType::OneG, None, None);
        assert!((overall_only - 20.0).abs() <= f64::EPSILON);

        let with_segment = factors.modify(10.0, StressType::OneG, Some(&segment), None);
        assert!((with_segment - 25.0).abs() <= f64::EPSILON);

        let all = factors.modify(10.0, StressType::OneG, Some(&segment), Some("C"));
        assert!((all - 9.0).abs() <= f64::EPSILON);
    }

    #[test]
    fn loadcase_add_follows_segment() {
        let mut factors = precedence_factors();
        factors.loadcases[0].modifier = Modifier::new(Method::Add, 1.0);
        let segment = Segment::new("S", 1);

        let stress = factors.modify(10.0, StressType::OneG, Some(&segment), Some("C"));
        assert!((stress - 26.0).abs() <= f64::EPSILON);
    }

    #[test]
    fn only_first_matching_segment_is_used() {
        let mut factors = Factors::default();
        factors.segments.push(
            SegmentFactor::new(Segment::new("S", 1)).with(StressType::Increment, Modifier::new(Method::Multiply, 3.0)),
        );
        factors.segments.push(
            SegmentFactor::new(Segment::new("S", 1)).with(StressType::Increment, Modifier::new(Method::Add, 100.0)),
        );

        let stress = factors.modify(2.0, StressType::Increment, Some(&Segment::new("S", 1)), None);
        assert!((stress - 6.0).abs() <= f64::EPSILON);
    }

    #[test]
    fn segment_needs_matching_order() {
        let factors = precedence_factors();
        let stress = factors.modify(10.0, StressType::OneG, Some(&Segment::new("S", 2)), None);
        assert!((stress - 20.0).abs() <= f64::EPSILON);
    }

    #[test]
    fn only_first_matching_loadcase_is_used() {
        let mut factors = Factors::default();
        factors.loadcases.push(LoadcaseFactor::new("C", Modifier::new(Method::Add, 1.0)));
        factors.loadcases.push(LoadcaseFactor::new("C", Modifier::new(Method::Set, 0.0)));

        let stress = factors.modify(4.0, StressType::DeltaP, None, Some("C"));
        assert!((stress - 5.0).abs() <= f64::EPSILON);
    }

    #[test]
    fn loadcase_pass_can_match_either_code() {
        let mut factors = Factors::default();
        factors.loadcases.push(LoadcaseFactor::new("INF", Modifier::new(Method::Multiply, 0.5)));
        factors.loadcases.push(LoadcaseFactor::new("SUP", Modifier::new(Method::Multiply, 10.0)));

        let stress = factors.modify_matching(8.0, StressType::DeltaT, None, &["SUP", "INF"]);
        assert!((stress - 4.0).abs() <= f64::EPSILON);
    }

    #[test]
    fn other_stress_types_are_untouched() {
        let factors = precedence_factors();
        let stress = factors.modify(10.0, StressType::DeltaT, Some(&Segment::new("S", 1)), None);
        assert!((stress - 10.0).abs() <= f64::EPSILON);
    }

    #[test]
    fn modifier_parses_method_and_value() {
        assert_eq!("multiply:1.5".parse::<Modifier>(), Ok(Modifier::new(Method::Multiply, 1.5)));
        assert_eq!("SET:-3".parse::<Modifier>(), Ok(Modifier::new(Method::Set, -3.0)));
        assert!("divide:2".parse::<Modifier>().is_err());
        assert!("add".parse::<Modifier>().is_err());
    }

    #[test]
    fn segment_name_is_taken_from_flight_phase() {
        assert_eq!(extract_segment_name("CRUISE_1G_A"), "CRUISE");
        assert_eq!(extract_segment_name("TAXI"), "TAXI");
        assert_eq!(Segment::from_flight_phase(" CLIMB_2 ", 3), Segment::new("CLIMB", 3));
    }
}
