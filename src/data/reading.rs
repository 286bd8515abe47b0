//! Water reading data structures.

use chrono::{DateTime, Utc};

/// One set of sensor values reported by the wand.
///
/// Each parameter is optional: depending on which probes are fitted, a frame
/// may carry only a subset of sensors. A reading always carries at least one
/// value; frames with none are rejected by the decoder.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WaterReading {
    /// Acidity, pH units.
    pub ph: Option<f64>,
    /// Oxidation-reduction potential in millivolts.
    pub orp: Option<f64>,
    /// Total dissolved solids in parts per million.
    pub tds: Option<f64>,
    /// Water temperature in degrees Celsius.
    pub temperature_c: Option<f64>,
    /// When the frame carrying this reading was received.
    pub captured_at: DateTime<Utc>,
}

impl WaterReading {
    /// Water temperature in degrees Fahrenheit.
    pub fn temperature_f(&self) -> Option<f64> {
        self.temperature_c.map(|c| c * 9.0 / 5.0 + 32.0)
    }

    /// Number of parameters present in this reading.
    pub fn present_count(&self) -> usize {
        [self.ph, self.orp, self.tds, self.temperature_c]
            .iter()
            .filter(|v| v.is_some())
            .count()
    }

    /// Check if no parameter is present.
    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }
}

impl std::fmt::Display for WaterReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn field(value: Option<f64>, precision: usize) -> String {
            value
                .map(|v| format!("{:.*}", precision, v))
                .unwrap_or_else(|| "--".to_string())
        }

        write!(
            f,
            "pH {} | ORP {} mV | TDS {} ppm | {} °C",
            field(self.ph, 2),
            field(self.orp, 0),
            field(self.tds, 0),
            field(self.temperature_c, 1),
        )
    }
}
