//! Lead Extraction
//!
//! Pattern-matches one utterance for contact and business fields. All
//! matching is best-effort: a pattern that finds nothing leaves its
//! field unset, and prior values in the session's sheet are only
//! overwritten by a new non-empty match.

use once_cell::sync::Lazy;
use regex::Regex;

use voicebridge_core::{LeadField, LeadSheet};

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    // Capitalized words only, so "I'm good" never reads as a name.
    Regex::new(r"\b(?i:my name is|i am|i'm|this is)\s+([A-Z][a-zA-Z'-]+(?:\s+[A-Z][a-zA-Z'-]+){0,2})")
        .unwrap()
});

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b").unwrap());

static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:phone|number|call me(?: back)?(?: at)?|reach me(?: at)?)\D{0,12}(\+?\d[\d\s().-]{5,}\d)")
        .unwrap()
});

static BUSINESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?i:my|our|the)\s+(?i:business|company)(?:\s+(?i:is))?(?:\s+(?i:called|named))?\s+([A-Z][\w&'-]*(?:\s+[A-Z][\w&'-]*){0,3})",
    )
    .unwrap()
});

/// Keyword table for the coarse business-type classification.
const BUSINESS_TYPES: &[(&str, &[&str])] = &[
    ("hotel", &["hotel", "motel", "inn", "resort", "bed and breakfast"]),
    ("clinic", &["clinic", "dental", "dentist", "medical", "doctor"]),
    ("salon", &["salon", "spa", "barber", "nail"]),
    ("rental", &["rental", "rentals", "rent out", "leasing"]),
    ("restaurant", &["restaurant", "cafe", "diner", "bakery", "pizzeria"]),
    ("retail", &["retail", "store", "shop", "boutique"]),
];

/// Field matches found in one utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadMatches {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub business: Option<String>,
    pub business_type: Option<String>,
}

impl LeadMatches {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.business.is_none()
            && self.business_type.is_none()
    }

    /// Merge the matches into a session's collected sheet,
    /// last-write-wins per field.
    pub fn apply_to(&self, sheet: &mut LeadSheet) {
        if let Some(name) = &self.name {
            sheet.fill(LeadField::Name, name);
        }
        if let Some(email) = &self.email {
            sheet.fill(LeadField::Email, email);
        }
        if let Some(phone) = &self.phone {
            sheet.fill(LeadField::Phone, phone);
        }
        if let Some(business) = &self.business {
            sheet.fill(LeadField::Business, business);
        }
        if let Some(business_type) = &self.business_type {
            sheet.fill(LeadField::BusinessType, business_type);
        }
    }
}

/// Pure pattern-matching lead extractor.
#[derive(Debug, Clone, Default)]
pub struct LeadExtractor;

impl LeadExtractor {
    /// Extract every recognizable lead field from one utterance.
    pub fn extract(text: &str) -> LeadMatches {
        LeadMatches {
            name: Self::extract_name(text),
            email: Self::extract_email(text),
            phone: Self::extract_phone(text),
            business: Self::extract_business(text),
            business_type: Self::extract_business_type(text),
        }
    }

    fn extract_name(text: &str) -> Option<String> {
        NAME_RE
            .captures(text)
            .map(|caps| caps[1].trim().to_string())
    }

    fn extract_email(text: &str) -> Option<String> {
        EMAIL_RE.find(text).map(|m| m.as_str().to_string())
    }

    fn extract_phone(text: &str) -> Option<String> {
        let caps = PHONE_RE.captures(text)?;
        let digits: String = caps[1].chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() >= 7 {
            Some(digits)
        } else {
            None
        }
    }

    fn extract_business(text: &str) -> Option<String> {
        BUSINESS_RE
            .captures(text)
            .map(|caps| caps[1].trim().to_string())
    }

    fn extract_business_type(text: &str) -> Option<String> {
        let lowered = text.to_lowercase();
        for (label, keywords) in BUSINESS_TYPES {
            if keywords.iter().any(|kw| lowered.contains(kw)) {
                return Some(label.to_string());
            }
        }
        None
    }
}
