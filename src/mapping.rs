//! Field mapping: records → destination-form field identifiers.
//!
//! Pure and total. Every identifier in [`field_ids::ALL_TEXT_FIELDS`] is
//! always present in the [`FieldValueMap`]; absent values map to `""`,
//! which the form filler skips. The checkbox map only carries entries whose
//! source value is known (`None` = leave the box alone).
//!
//! The destination form labels two inputs "Given Name(s)" with the same
//! element id. The first slot takes `given_names`; the second is addressed
//! through the virtual id [`field_ids::PASSPORT_MIDDLE_NAME`] and takes
//! `middle_names`.
//!
//! Client fields from the G-28 are never mapped: the form has no client
//! section.

use crate::records::{PassportRecord, RepresentationRecord};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Element ids on the destination form.
pub mod field_ids {
    // Passport (Part 3)
    pub const PASSPORT_SURNAME: &str = "passport-surname";
    pub const PASSPORT_GIVEN_NAMES: &str = "passport-given-names";
    /// Virtual: resolves to the second `#passport-given-names` element.
    pub const PASSPORT_MIDDLE_NAME: &str = "passport-middle-name";
    pub const PASSPORT_NUMBER: &str = "passport-number";
    pub const PASSPORT_COUNTRY: &str = "passport-country";
    pub const PASSPORT_NATIONALITY: &str = "passport-nationality";
    pub const PASSPORT_DOB: &str = "passport-dob";
    pub const PASSPORT_POB: &str = "passport-pob";
    pub const PASSPORT_SEX: &str = "passport-sex";
    pub const PASSPORT_ISSUE_DATE: &str = "passport-issue-date";
    pub const PASSPORT_EXPIRY_DATE: &str = "passport-expiry-date";

    // Attorney (Part 1)
    pub const ONLINE_ACCOUNT: &str = "online-account";
    pub const FAMILY_NAME: &str = "family-name";
    pub const GIVEN_NAME: &str = "given-name";
    pub const MIDDLE_NAME: &str = "middle-name";
    pub const STREET_NUMBER: &str = "street-number";
    pub const CITY: &str = "city";
    pub const STATE: &str = "state";
    pub const ZIP: &str = "zip";
    pub const COUNTRY: &str = "country";
    pub const DAYTIME_PHONE: &str = "daytime-phone";
    pub const EMAIL: &str = "email";

    // Eligibility (Part 2)
    pub const LICENSING_AUTHORITY: &str = "licensing-authority";
    pub const BAR_NUMBER: &str = "bar-number";
    pub const LAW_FIRM: &str = "law-firm";

    // Checkboxes
    pub const NOT_SUBJECT: &str = "not-subject";

    pub const ALL_TEXT_FIELDS: [&str; 25] = [
        PASSPORT_SURNAME,
        PASSPORT_GIVEN_NAMES,
        PASSPORT_MIDDLE_NAME,
        PASSPORT_NUMBER,
        PASSPORT_COUNTRY,
        PASSPORT_NATIONALITY,
        PASSPORT_DOB,
        PASSPORT_POB,
        PASSPORT_SEX,
        PASSPORT_ISSUE_DATE,
        PASSPORT_EXPIRY_DATE,
        ONLINE_ACCOUNT,
        FAMILY_NAME,
        GIVEN_NAME,
        MIDDLE_NAME,
        STREET_NUMBER,
        CITY,
        STATE,
        ZIP,
        COUNTRY,
        DAYTIME_PHONE,
        EMAIL,
        LICENSING_AUTHORITY,
        BAR_NUMBER,
        LAW_FIRM,
    ];
}

/// Field id → display value. Ordered so two runs serialise identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldValueMap(BTreeMap<String, String>);

impl FieldValueMap {
    pub fn get(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries with a value to fill.
    pub fn non_empty(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(_, v)| !v.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn put(&mut self, id: &str, value: String) {
        self.0.insert(id.to_string(), value);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldValueMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Checkbox id → checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CheckboxMap(BTreeMap<String, bool>);

impl CheckboxMap {
    pub fn get(&self, id: &str) -> Option<bool> {
        self.0.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, bool)> for CheckboxMap {
    fn from_iter<T: IntoIterator<Item = (K, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// ISO calendar form, e.g. `2030-01-15`.
fn date(value: &Option<NaiveDate>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Project both records onto the destination form.
pub fn map_to_fields(
    passport: &PassportRecord,
    representation: &RepresentationRecord,
) -> (FieldValueMap, CheckboxMap) {
    use field_ids::*;

    let mut fields = FieldValueMap::default();

    fields.put(PASSPORT_SURNAME, text(&passport.surname));
    fields.put(PASSPORT_GIVEN_NAMES, text(&passport.given_names));
    fields.put(PASSPORT_MIDDLE_NAME, text(&passport.middle_names));
    fields.put(PASSPORT_NUMBER, text(&passport.passport_number));
    fields.put(PASSPORT_COUNTRY, text(&passport.country_of_issue));
    fields.put(PASSPORT_NATIONALITY, text(&passport.nationality));
    fields.put(PASSPORT_DOB, date(&passport.date_of_birth));
    fields.put(PASSPORT_POB, text(&passport.place_of_birth));
    fields.put(PASSPORT_SEX, text(&passport.sex));
    fields.put(PASSPORT_ISSUE_DATE, date(&passport.issue_date));
    fields.put(PASSPORT_EXPIRY_DATE, date(&passport.expiry_date));

    let attorney = representation.attorney.clone().unwrap_or_default();
    fields.put(ONLINE_ACCOUNT, text(&attorney.online_account));
    fields.put(FAMILY_NAME, text(&attorney.last_name));
    fields.put(GIVEN_NAME, text(&attorney.first_name));
    fields.put(MIDDLE_NAME, text(&attorney.middle_name));
    fields.put(STREET_NUMBER, text(&attorney.street));
    fields.put(CITY, text(&attorney.city));
    fields.put(STATE, text(&attorney.state));
    fields.put(ZIP, text(&attorney.zip));
    fields.put(COUNTRY, text(&attorney.country));
    fields.put(DAYTIME_PHONE, text(&attorney.phone));
    fields.put(EMAIL, text(&attorney.email));

    let eligibility = representation.eligibility.clone().unwrap_or_default();
    fields.put(LICENSING_AUTHORITY, text(&eligibility.licensing_authority));
    fields.put(BAR_NUMBER, text(&eligibility.bar_number));
    fields.put(LAW_FIRM, text(&eligibility.law_firm));

    let checkboxes = eligibility
        .is_not_subject_to_orders
        .map(|checked| (NOT_SUBJECT, checked))
        .into_iter()
        .collect();

    (fields, checkboxes)
}

#[cfg(test)]
mod tests {
    use super::field_ids::*;
    use super::*;
    use crate::records::{AttorneyInfo, ClientInfo, EligibilityInfo};
    use pretty_assertions::assert_eq;

    fn eligibility(flag: Option<bool>) -> RepresentationRecord {
        RepresentationRecord {
            eligibility: Some(EligibilityInfo {
                is_not_subject_to_orders: flag,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn empty_records_map_every_field_to_empty_string() {
        let (fields, checkboxes) =
            map_to_fields(&PassportRecord::default(), &RepresentationRecord::default());
        assert_eq!(fields.len(), ALL_TEXT_FIELDS.len());
        for id in ALL_TEXT_FIELDS {
            assert_eq!(fields.get(id), Some(""), "{id}");
        }
        assert!(checkboxes.is_empty());
        assert_eq!(fields.non_empty().count(), 0);
    }

    #[test]
    fn given_names_split_across_two_slots() {
        let passport = PassportRecord {
            given_names: Some("John".into()),
            middle_names: Some("Q".into()),
            ..Default::default()
        };
        let (fields, _) = map_to_fields(&passport, &RepresentationRecord::default());
        assert_eq!(fields.get(PASSPORT_GIVEN_NAMES), Some("John"));
        assert_eq!(fields.get(PASSPORT_MIDDLE_NAME), Some("Q"));

        let passport = PassportRecord {
            middle_names: None,
            ..passport
        };
        let (fields, _) = map_to_fields(&passport, &RepresentationRecord::default());
        assert_eq!(fields.get(PASSPORT_MIDDLE_NAME), Some(""));
    }

    #[test]
    fn dates_render_in_iso_form() {
        let passport = PassportRecord {
            expiry_date: NaiveDate::from_ymd_opt(2030, 1, 15),
            ..Default::default()
        };
        let (fields, _) = map_to_fields(&passport, &RepresentationRecord::default());
        assert_eq!(fields.get(PASSPORT_EXPIRY_DATE), Some("2030-01-15"));
        assert_eq!(fields.get(PASSPORT_DOB), Some(""));
        assert_eq!(fields.get(PASSPORT_ISSUE_DATE), Some(""));
    }

    #[test]
    fn checkbox_distinguishes_null_from_false() {
        let passport = PassportRecord::default();
        assert!(map_to_fields(&passport, &eligibility(None)).1.is_empty());

        let (_, unchecked) = map_to_fields(&passport, &eligibility(Some(false)));
        assert_eq!(unchecked.len(), 1);
        assert_eq!(unchecked.get(NOT_SUBJECT), Some(false));

        let (_, checked) = map_to_fields(&passport, &eligibility(Some(true)));
        assert_eq!(checked.get(NOT_SUBJECT), Some(true));
    }

    #[test]
    fn attorney_fields_and_no_client_fields() {
        let representation = RepresentationRecord {
            attorney: Some(AttorneyInfo {
                first_name: Some("Jane".into()),
                last_name: Some("Roe".into()),
                street: Some("1 Main St".into()),
                phone: Some("555-0100".into()),
                fax: Some("555-0199".into()),
                ..Default::default()
            }),
            client: Some(ClientInfo {
                first_name: Some("John".into()),
                a_number: Some("A123".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let (fields, _) = map_to_fields(&PassportRecord::default(), &representation);
        assert_eq!(fields.get(GIVEN_NAME), Some("Jane"));
        assert_eq!(fields.get(FAMILY_NAME), Some("Roe"));
        assert_eq!(fields.get(STREET_NUMBER), Some("1 Main St"));
        assert_eq!(fields.get(DAYTIME_PHONE), Some("555-0100"));
        assert_eq!(fields.len(), ALL_TEXT_FIELDS.len());
        assert!(fields.iter().all(|(_, v)| v != "555-0199" && v != "A123"));
    }

    #[test]
    fn mapping_is_idempotent() {
        let passport = PassportRecord {
            surname: Some("DOE".into()),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 7, 4),
            ..Default::default()
        };
        let representation = eligibility(Some(true));
        let a = map_to_fields(&passport, &representation);
        let b = map_to_fields(&passport, &representation);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.0).unwrap(),
            serde_json::to_string(&b.0).unwrap()
        );
    }
}
