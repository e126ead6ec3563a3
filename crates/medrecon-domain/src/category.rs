//! Entity categories and vital sign kinds

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a clinical entity
///
/// Reconciliation runs within a category and never merges across categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    /// Medication mention
    Medication,
    /// Problem / diagnosis mention
    Problem,
    /// Vital sign measurement
    Vital,
    /// Lab result or diagnostic finding
    #[serde(rename = "result")]
    LabResult,
    /// Treatment plan action
    PlanItem,
}

impl EntityCategory {
    /// All categories in canonical processing order
    pub const ALL: [EntityCategory; 5] = [
        EntityCategory::Medication,
        EntityCategory::Problem,
        EntityCategory::Vital,
        EntityCategory::LabResult,
        EntityCategory::PlanItem,
    ];

    /// Stable string form used in logs and review reasons
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Medication => "medication",
            EntityCategory::Problem => "problem",
            EntityCategory::Vital => "vital",
            EntityCategory::LabResult => "result",
            EntityCategory::PlanItem => "plan_item",
        }
    }

    /// Parse a category name, accepting the plural/section spellings upstream uses
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "medication" | "medications" => Some(EntityCategory::Medication),
            "problem" | "problems" | "problem_list" | "diagnosis" => Some(EntityCategory::Problem),
            "vital" | "vitals" | "vital_sign" | "vital_signs" => Some(EntityCategory::Vital),
            "result" | "results" | "lab_result" | "lab_results" => Some(EntityCategory::LabResult),
            "plan" | "plan_item" | "plan_items" => Some(EntityCategory::PlanItem),
            _ => None,
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of vital sign; vitals are matched per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalKind {
    /// Systolic/diastolic pair, e.g. `120/80`
    BloodPressure,
    /// Pulse
    HeartRate,
    /// Body temperature
    Temperature,
    /// Breaths per minute
    RespiratoryRate,
    /// SpO2
    OxygenSaturation,
    /// Body weight
    Weight,
    /// Body height
    Height,
    /// Body mass index
    Bmi,
}

impl VitalKind {
    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            VitalKind::BloodPressure => "blood_pressure",
            VitalKind::HeartRate => "heart_rate",
            VitalKind::Temperature => "temperature",
            VitalKind::RespiratoryRate => "respiratory_rate",
            VitalKind::OxygenSaturation => "oxygen_saturation",
            VitalKind::Weight => "weight",
            VitalKind::Height => "height",
            VitalKind::Bmi => "bmi",
        }
    }

    /// Parse a vital kind from its name or a common chart abbreviation
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        match key.trim_matches('_') {
            "blood_pressure" | "bp" => Some(VitalKind::BloodPressure),
            "heart_rate" | "hr" | "pulse" | "p" => Some(VitalKind::HeartRate),
            "temperature" | "temp" | "t" => Some(VitalKind::Temperature),
            "respiratory_rate" | "rr" | "resp" => Some(VitalKind::RespiratoryRate),
            "oxygen_saturation" | "spo2" | "o2_sat" | "sao2" | "o2sat" => {
                Some(VitalKind::OxygenSaturation)
            }
            "weight" | "wt" => Some(VitalKind::Weight),
            "height" | "ht" => Some(VitalKind::Height),
            "bmi" => Some(VitalKind::Bmi),
            _ => None,
        }
    }
}

impl fmt::Display for VitalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
