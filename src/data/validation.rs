//! Plausibility checks for decoded readings.
//!
//! Validation is advisory. Values near the edge of a range are legitimate
//! while a probe drifts out of calibration, so implausible values are
//! flagged and the reading is still returned to the caller.

use std::ops::RangeInclusive;

use crate::data::reading::WaterReading;

/// A measured parameter of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parameter {
    /// pH.
    Ph,
    /// Oxidation-reduction potential.
    Orp,
    /// Total dissolved solids.
    Tds,
    /// Temperature.
    Temperature,
}

impl Parameter {
    /// All parameters, in frame order.
    pub const ALL: [Parameter; 4] = [Self::Ph, Self::Orp, Self::Tds, Self::Temperature];

    /// Plausible range for this parameter.
    pub fn plausible_range(self) -> RangeInclusive<f64> {
        match self {
            Self::Ph => 0.0..=14.0,
            Self::Orp => -2000.0..=2000.0,
            Self::Tds => 0.0..=9999.0,
            Self::Temperature => -10.0..=60.0,
        }
    }

    /// Unit the parameter is expressed in.
    pub fn unit(self) -> &'static str {
        match self {
            Self::Ph => "pH",
            Self::Orp => "mV",
            Self::Tds => "ppm",
            Self::Temperature => "°C",
        }
    }

    fn value_in(self, reading: &WaterReading) -> Option<f64> {
        match self {
            Self::Ph => reading.ph,
            Self::Orp => reading.orp,
            Self::Tds => reading.tds,
            Self::Temperature => reading.temperature_c,
        }
    }
}

/// A value outside its plausible range.
#[derive(Debug, Clone, PartialEq)]
pub struct PlausibilityFlag {
    /// The parameter that is out of range.
    pub parameter: Parameter,
    /// The reported value.
    pub value: f64,
}

impl std::fmt::Display for PlausibilityFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let range = self.parameter.plausible_range();
        write!(
            f,
            "{:?} {} {} outside {}..={}",
            self.parameter,
            self.value,
            self.parameter.unit(),
            range.start(),
            range.end()
        )
    }
}

/// Result of [`validate_reading`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationResult {
    /// Out-of-range values, in frame order.
    pub flags: Vec<PlausibilityFlag>,
}

impl ValidationResult {
    /// Check if every present value is within its plausible range.
    pub fn is_plausible(&self) -> bool {
        self.flags.is_empty()
    }

    /// Check if a particular parameter was flagged.
    pub fn is_flagged(&self, parameter: Parameter) -> bool {
        self.flags.iter().any(|f| f.parameter == parameter)
    }
}

/// Check every present value of a reading against its plausible range.
///
/// Absent values are not flagged. NaN is always flagged.
pub fn validate_reading(reading: &WaterReading) -> ValidationResult {
    let flags = Parameter::ALL
        .iter()
        .filter_map(|&parameter| {
            let value = parameter.value_in(reading)?;
            (!parameter.plausible_range().contains(&value))
                .then_some(PlausibilityFlag { parameter, value })
        })
        .collect();

    ValidationResult { flags }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn reading(ph: f64, orp: f64, tds: f64, temperature_c: f64) -> WaterReading {
        WaterReading {
            ph: Some(ph),
            orp: Some(orp),
            tds: Some(tds),
            temperature_c: Some(temperature_c),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_plausible_reading() {
        let result = validate_reading(&reading(7.2, 245.0, 312.0, 24.5));
        assert!(result.is_plausible());
    }

    #[test]
    fn test_edges_are_plausible() {
        assert!(validate_reading(&reading(0.0, -2000.0, 0.0, -10.0)).is_plausible());
        assert!(validate_reading(&reading(14.0, 2000.0, 9999.0, 60.0)).is_plausible());
    }

    #[test]
    fn test_out_of_range_is_flagged() {
        let result = validate_reading(&reading(14.5, 245.0, 312.0, 61.0));
        assert_eq!(
            result.flags,
            vec![
                PlausibilityFlag {
                    parameter: Parameter::Ph,
                    value: 14.5
                },
                PlausibilityFlag {
                    parameter: Parameter::Temperature,
                    value: 61.0
                },
            ]
        );
        assert!(result.is_flagged(Parameter::Ph));
        assert!(!result.is_flagged(Parameter::Orp));
    }

    #[test]
    fn test_absent_values_not_flagged() {
        let reading = WaterReading {
            ph: None,
            orp: None,
            tds: Some(10_500.0),
            temperature_c: None,
            captured_at: Utc::now(),
        };
        let result = validate_reading(&reading);
        assert_eq!(result.flags.len(), 1);
        assert!(result.is_flagged(Parameter::Tds));
    }

    #[test]
    fn test_nan_is_flagged() {
        assert!(validate_reading(&reading(f64::NAN, 0.0, 0.0, 20.0)).is_flagged(Parameter::Ph));
    }

    #[test]
    fn test_flag_display() {
        let flag = PlausibilityFlag {
            parameter: Parameter::Ph,
            value: 14.5,
        };
        assert_eq!(flag.to_string(), "Ph 14.5 pH outside 0..=14");
    }
}
