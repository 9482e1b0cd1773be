use serde::{Deserialize, Serialize};

/// Title the dashboard puts on grid-demand events while exporting.
pub const SELLING_TITLE: &str = "Selling";

/// Household grid power flow in kW. Positive = importing (buying),
/// negative = exporting (selling).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DemandReading {
    pub kw: f64,
}

impl DemandReading {
    pub fn new(kw: f64) -> Self {
        Self { kw }
    }

    /// Builds a reading from the raw event magnitude, negated when the event
    /// is titled as selling.
    pub fn from_event(value: f64, title: Option<&str>) -> Self {
        match title {
            Some(SELLING_TITLE) => Self::new(-value),
            _ => Self::new(value),
        }
    }

    pub fn is_importing(&self) -> bool {
        self.kw > 0.0
    }
}

/// Most recent grid-demand reading; 0 kW until the first one arrives.
#[derive(Debug, Clone, Default)]
pub struct DemandTracker {
    current: DemandReading,
    updates: u64,
}

impl DemandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, reading: DemandReading) {
        self.current = reading;
        self.updates += 1;
    }

    pub fn current(&self) -> DemandReading {
        self.current
    }

    pub fn has_reading(&self) -> bool {
        self.updates > 0
    }
}
