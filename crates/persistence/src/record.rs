//! Call record assembly

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use voicebridge_core::{LeadField, LeadSheet, Transcript};

/// One persistable record per terminated call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_sid: String,
    pub caller_phone: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub business: Option<String>,
    pub business_type: Option<String>,
    /// Full transcript, lines joined with line breaks.
    pub transcript: String,
    /// One-line human-readable summary of what was collected.
    pub summary: String,
    pub duration_secs: u64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl CallRecord {
    /// Assemble the record for a finished call.
    ///
    /// Returns `None` when nothing was collected and nothing was said;
    /// an empty call produces no datastore write.
    pub fn build(
        call_sid: &str,
        caller_phone: Option<&str>,
        leads: &LeadSheet,
        transcript: &Transcript,
        duration: Duration,
    ) -> Option<Self> {
        if leads.is_empty() && transcript.is_empty() {
            return None;
        }

        Some(Self {
            call_sid: call_sid.to_string(),
            caller_phone: caller_phone.map(str::to_string),
            name: leads.get(LeadField::Name).map(str::to_string),
            email: leads.get(LeadField::Email).map(str::to_string),
            phone: leads.get(LeadField::Phone).map(str::to_string),
            business: leads.get(LeadField::Business).map(str::to_string),
            business_type: leads.get(LeadField::BusinessType).map(str::to_string),
            transcript: transcript.render(),
            summary: leads.summary(),
            duration_secs: duration.as_secs(),
            status: "new".to_string(),
            created_at: Utc::now(),
        })
    }
}
