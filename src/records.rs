//! Structured records produced by the joint extraction call.
//!
//! Every field is independently optional. Absence is the normal state for a
//! field the document does not show, and an entirely empty record is valid.
//! Records are built once by [`crate::pipeline::extract`] and never mutated
//! afterwards; [`crate::mapping`] only reads them.

use chrono::NaiveDate;
use serde::Serialize;

/// Identity data read from the passport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassportRecord {
    pub surname: Option<String>,
    pub given_names: Option<String>,
    pub middle_names: Option<String>,
    pub passport_number: Option<String>,
    pub country_of_issue: Option<String>,
    pub nationality: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub place_of_birth: Option<String>,
    /// `M`, `F` or `X` as printed; not normalised.
    pub sex: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
}

/// Data read from the G-28 attorney-representation form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepresentationRecord {
    pub attorney: Option<AttorneyInfo>,
    pub eligibility: Option<EligibilityInfo>,
    /// Parsed and kept, but never mapped: the destination form has no
    /// client section.
    pub client: Option<ClientInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttorneyInfo {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    /// Two-letter abbreviation when the model could infer one.
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub fax: Option<String>,
    /// USCIS online account number.
    pub online_account: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EligibilityInfo {
    pub licensing_authority: Option<String>,
    pub bar_number: Option<String>,
    pub law_firm: Option<String>,
    /// `None` leaves the checkbox untouched; `Some(false)` unchecks it.
    pub is_not_subject_to_orders: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Alien registration number.
    pub a_number: Option<String>,
}

impl PassportRecord {
    /// Number of fields the extraction populated.
    pub fn populated_fields(&self) -> usize {
        let text = [
            &self.surname,
            &self.given_names,
            &self.middle_names,
            &self.passport_number,
            &self.country_of_issue,
            &self.nationality,
            &self.place_of_birth,
            &self.sex,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count();
        let dates = [&self.date_of_birth, &self.issue_date, &self.expiry_date]
            .iter()
            .filter(|f| f.is_some())
            .count();
        text + dates
    }
}

impl RepresentationRecord {
    pub fn is_empty(&self) -> bool {
        self.attorney.is_none() && self.eligibility.is_none() && self.client.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_records_are_empty() {
        assert_eq!(PassportRecord::default().populated_fields(), 0);
        assert!(RepresentationRecord::default().is_empty());
    }

    #[test]
    fn populated_fields_counts_dates_and_text() {
        let record = PassportRecord {
            surname: Some("Doe".into()),
            expiry_date: NaiveDate::from_ymd_opt(2030, 1, 15),
            ..Default::default()
        };
        assert_eq!(record.populated_fields(), 2);
    }

    #[test]
    fn dates_serialise_in_iso_form() {
        let record = PassportRecord {
            date_of_birth: NaiveDate::from_ymd_opt(1990, 7, 4),
            ..Default::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["date_of_birth"], "1990-07-04");
        assert!(json["surname"].is_null());
    }
}
