use serde::{Deserialize, Serialize};

/// A filled-in form captured on the device, plus the stop it was filled at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub form_id: i64,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl SubmissionPayload {
    pub fn validate(&self) -> Result<(), String> {
        if self.form_id <= 0 {
            return Err("formId must be a positive integer".to_string());
        }
        if !self.data.is_object() {
            return Err("data must be a JSON object".to_string());
        }
        if let Some(stop_id) = self.stop_id {
            if stop_id <= 0 {
                return Err("stopId must be a positive integer".to_string());
            }
        }
        if let Some(loc) = &self.location {
            if !(-90.0..=90.0).contains(&loc.latitude) || !(-180.0..=180.0).contains(&loc.longitude) {
                return Err("location is out of range".to_string());
            }
        }
        Ok(())
    }
}
