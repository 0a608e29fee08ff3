//! Structured extraction: both document texts in, both records out, from a
//! single joint remote-model call.
//!
//! The answer is repaired rather than deserialised strictly. Models drift
//! (numbers where strings were asked for, `""` instead of `null`, dates in
//! the wrong format) and a single odd leaf must not sink the request. Only
//! three things are fatal:
//!
//! - the call itself failing (classified in [`crate::pipeline::llm`]),
//! - the answer not being JSON ([`ExtractionError::InvalidJson`], carrying
//!   the parser diagnostic and an excerpt of the answer),
//! - the answer not having the record shape ([`ExtractionError::Schema`]).
//!
//! Cross-document checks (does the G-28 client match the passport holder?)
//! are left to the model and come back as free-text `validation_notes`,
//! which are logged and returned but never interpreted.

use crate::config::PipelineConfig;
use crate::error::ExtractionError;
use crate::pipeline::acquire::excerpt;
use crate::pipeline::llm::{complete_with_retry, LanguageModel, RetryPolicy};
use crate::pipeline::postprocess::strip_code_fences;
use crate::prompts::{extraction_prompt, DEFAULT_EXTRACTION_PROMPT, INVALID_JSON_REMINDER};
use crate::records::{
    AttorneyInfo, ClientInfo, EligibilityInfo, PassportRecord, RepresentationRecord,
};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Characters of the offending answer kept in an invalid-JSON error.
const EXCERPT_CHARS: usize = 500;

/// Result of one extraction call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub passport: PassportRecord,
    pub representation: RepresentationRecord,
    /// The model's own remarks on discrepancies between the documents.
    pub validation_notes: Option<String>,
}

pub struct StructuredExtractor {
    model: Arc<dyn LanguageModel>,
    template: String,
    retry: RetryPolicy,
    retry_on_invalid_json: bool,
}

impl StructuredExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, config: &PipelineConfig) -> Self {
        Self {
            model,
            template: config
                .extraction_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_EXTRACTION_PROMPT.to_string()),
            retry: RetryPolicy::from_config(config),
            retry_on_invalid_json: config.retry_on_invalid_json,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Extract both records.
    pub async fn extract_records(
        &self,
        passport_text: &str,
        g28_text: &str,
    ) -> Result<(PassportRecord, RepresentationRecord), ExtractionError> {
        let extraction = self.extract(passport_text, g28_text).await?;
        Ok((extraction.passport, extraction.representation))
    }

    /// Extract both records plus the model's validation notes.
    pub async fn extract(
        &self,
        passport_text: &str,
        g28_text: &str,
    ) -> Result<Extraction, ExtractionError> {
        let prompt = extraction_prompt(&self.template, passport_text, g28_text);
        info!(
            "Sending extraction request to {} ({} prompt characters)",
            self.model.model_name(),
            prompt.chars().count()
        );

        let raw = self.call(&prompt).await?;
        let extraction = match parse_extraction(&raw) {
            Err(ExtractionError::InvalidJson { diagnostic, .. }) if self.retry_on_invalid_json => {
                warn!("Model answer was not valid JSON ({}); asking once more", diagnostic);
                let retry_prompt = format!("{prompt}\n\n{INVALID_JSON_REMINDER}");
                let raw = self.call(&retry_prompt).await?;
                parse_extraction(&raw)
            }
            other => other,
        }
        .inspect_err(|e| error!("LLM extraction failed: {}", e))?;

        if let Some(notes) = &extraction.validation_notes {
            info!("LLM validation notes: {}", notes);
        }
        info!(
            "Extracted passport ({} fields) and G-28 (attorney: {}, eligibility: {}, client: {})",
            extraction.passport.populated_fields(),
            extraction.representation.attorney.is_some(),
            extraction.representation.eligibility.is_some(),
            extraction.representation.client.is_some()
        );
        Ok(extraction)
    }

    async fn call(&self, prompt: &str) -> Result<String, ExtractionError> {
        let raw = complete_with_retry(self.model.as_ref(), prompt, self.retry)
            .await
            .inspect_err(|e| error!("LLM extraction failed: {}", e))?;
        debug!("Model raw response:\n{}", excerpt(&raw, 2000));
        Ok(raw)
    }
}

// ── Parsing and repair ───────────────────────────────────────────────────

/// Parse and repair a raw model answer.
pub fn parse_extraction(raw: &str) -> Result<Extraction, ExtractionError> {
    let cleaned = strip_code_fences(raw);
    let value: Value = serde_json::from_str(&cleaned).map_err(|e| {
        error!("Failed to parse JSON from model response: {}", e);
        ExtractionError::InvalidJson {
            diagnostic: e.to_string(),
            excerpt: excerpt(&cleaned, EXCERPT_CHARS).to_string(),
        }
    })?;

    let root = value.as_object().ok_or_else(|| ExtractionError::Schema {
        detail: format!("top-level value is {}, expected an object", kind(&value)),
    })?;

    let passport = group(root, "passport")?
        .map(passport_record)
        .unwrap_or_default();

    let representation = match group(root, "g28")? {
        Some(g28) => RepresentationRecord {
            attorney: group(g28, "attorney")?.map(attorney_info),
            eligibility: group(g28, "eligibility")?.map(eligibility_info),
            client: group(g28, "client")?.map(client_info),
        },
        None => RepresentationRecord::default(),
    };

    Ok(Extraction {
        passport,
        representation,
        validation_notes: text(root, "validation_notes"),
    })
}

/// A nested object member. Missing, `null` and `{}` all mean "absent".
fn group<'a>(
    parent: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ExtractionError> {
    match parent.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(ExtractionError::Schema {
            detail: format!("'{}' is {}, expected an object or null", key, kind(other)),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A string leaf: trimmed, empty → absent, numbers → decimal string,
/// anything else → absent.
fn text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Null => None,
        other => {
            debug!("Ignoring '{}': {} where a string was expected", key, kind(other));
            None
        }
    }
}

/// A `YYYY-MM-DD` leaf. Anything unparseable degrades to absent.
fn date(map: &Map<String, Value>, key: &str) -> Option<NaiveDate> {
    let raw = text(map, key)?;
    match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(e) => {
            warn!("Failed to parse {} '{}': {}", key, raw, e);
            None
        }
    }
}

fn flag(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn passport_record(m: &Map<String, Value>) -> PassportRecord {
    PassportRecord {
        surname: text(m, "surname"),
        given_names: text(m, "given_names"),
        middle_names: text(m, "middle_names"),
        passport_number: text(m, "passport_number"),
        country_of_issue: text(m, "country_of_issue"),
        nationality: text(m, "nationality"),
        date_of_birth: date(m, "date_of_birth"),
        place_of_birth: text(m, "place_of_birth"),
        sex: text(m, "sex"),
        issue_date: date(m, "issue_date"),
        expiry_date: date(m, "expiry_date"),
    }
}

fn attorney_info(m: &Map<String, Value>) -> AttorneyInfo {
    AttorneyInfo {
        first_name: text(m, "first_name"),
        middle_name: text(m, "middle_name"),
        last_name: text(m, "last_name"),
        street: text(m, "street"),
        city: text(m, "city"),
        state: text(m, "state"),
        zip: text(m, "zip"),
        country: text(m, "country"),
        phone: text(m, "phone"),
        email: text(m, "email"),
        fax: text(m, "fax"),
        online_account: text(m, "online_account"),
    }
}

fn eligibility_info(m: &Map<String, Value>) -> EligibilityInfo {
    EligibilityInfo {
        licensing_authority: text(m, "licensing_authority"),
        bar_number: text(m, "bar_number"),
        law_firm: text(m, "law_firm"),
        is_not_subject_to_orders: flag(m, "is_not_subject_to_orders"),
    }
}

fn client_info(m: &Map<String, Value>) -> ClientInfo {
    ClientInfo {
        first_name: text(m, "first_name"),
        middle_name: text(m, "middle_name"),
        last_name: text(m, "last_name"),
        street: text(m, "street"),
        city: text(m, "city"),
        state: text(m, "state"),
        zip: text(m, "zip"),
        country: text(m, "country"),
        phone: text(m, "phone"),
        email: text(m, "email"),
        a_number: text(m, "a_number"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ANSWER: &str = r#"{
      "passport": {
        "surname": "DOE", "given_names": "JOHN", "middle_names": null,
        "passport_number": 123456789, "country_of_issue": "USA",
        "date_of_birth": "1990-07-04", "issue_date": "2020-02-30",
        "expiry_date": "15/01/2030", "sex": " M "
      },
      "g28": {
        "attorney": {"first_name": "Jane", "last_name": "Roe", "state": "CA", "fax": ""},
        "eligibility": {"bar_number": "12345", "is_not_subject_to_orders": "TRUE"},
        "client": {"a_number": "A123"}
      },
      "validation_notes": "Names match."
    }"#;

    #[test]
    fn repairs_leaves_and_degrades_bad_dates() {
        let x = parse_extraction(ANSWER).unwrap();
        assert_eq!(x.passport.surname.as_deref(), Some("DOE"));
        assert_eq!(x.passport.passport_number.as_deref(), Some("123456789"));
        assert_eq!(x.passport.sex.as_deref(), Some("M"));
        assert_eq!(x.passport.date_of_birth, NaiveDate::from_ymd_opt(1990, 7, 4));
        assert_eq!(x.passport.issue_date, None, "impossible calendar date");
        assert_eq!(x.passport.expiry_date, None, "wrong format");

        let attorney = x.representation.attorney.unwrap();
        assert_eq!(attorney.first_name.as_deref(), Some("Jane"));
        assert_eq!(attorney.fax, None);
        let eligibility = x.representation.eligibility.unwrap();
        assert_eq!(eligibility.is_not_subject_to_orders, Some(true));
        assert_eq!(x.representation.client.unwrap().a_number.as_deref(), Some("A123"));
        assert_eq!(x.validation_notes.as_deref(), Some("Names match."));
    }

    #[test]
    fn fenced_answer_parses_like_bare_answer() {
        let fenced = format!("```json\n{}\n```", ANSWER);
        assert_eq!(parse_extraction(&fenced).unwrap(), parse_extraction(ANSWER).unwrap());
    }

    #[test]
    fn all_null_answer_is_valid() {
        let x = parse_extraction(r#"{"passport": null, "g28": null, "validation_notes": null}"#)
            .unwrap();
        assert_eq!(x, Extraction::default());
        assert_eq!(parse_extraction("{}").unwrap(), Extraction::default());
    }

    #[test]
    fn invalid_json_keeps_diagnostic_and_excerpt() {
        let err = parse_extraction("Sure! Here is the data you asked for").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid JSON"), "{msg}");
        assert!(msg.contains("Sure! Here is the data"), "{msg}");
    }

    #[test]
    fn excerpt_is_bounded() {
        let long = "x".repeat(2_000);
        match parse_extraction(&long).unwrap_err() {
            ExtractionError::InvalidJson { excerpt, .. } => assert_eq!(excerpt.len(), 500),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn wrong_shapes_are_schema_errors() {
        for bad in [r#"[1, 2]"#, r#"{"passport": "DOE"}"#, r#"{"g28": {"attorney": [1]}}"#] {
            assert!(
                matches!(parse_extraction(bad), Err(ExtractionError::Schema { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn checkbox_accepts_only_booleans_and_boolean_strings() {
        let parse = |v: &str| {
            let json = format!(r#"{{"g28": {{"eligibility": {{"is_not_subject_to_orders": {v}}}}}}}"#);
            parse_extraction(&json)
                .unwrap()
                .representation
                .eligibility
                .and_then(|e| e.is_not_subject_to_orders)
        };
        assert_eq!(parse("false"), Some(false));
        assert_eq!(parse(r#""False""#), Some(false));
        assert_eq!(parse("null"), None);
        assert_eq!(parse(r#""yes""#), None);
        assert_eq!(parse("1"), None);
    }
}
