//! Prompts for the two remote-model calls.
//!
//! Callers can override the extraction prompt via
//! [`crate::config::PipelineConfig::extraction_prompt`]; the constants here
//! are used only when no override is provided.

/// Instruction for transcribing a passport (uploaded PDF or inline image).
pub const PASSPORT_TRANSCRIPTION_PROMPT: &str = r#"Extract ALL text from this passport document.
Return the text exactly as it appears, preserving line breaks and structure.
Include all visible text including:
- Names (surname, given names, middle names)
- Passport number
- Date of birth
- Place of birth
- Nationality
- Country of issue
- Issue date
- Expiry date
- Sex/Gender
- The machine-readable zone (MRZ) lines, character for character
- Any other text visible on the page

Return ONLY the extracted text, no explanations, no formatting, no markdown.
Preserve the original structure and line breaks."#;

/// Joint extraction prompt. `{passport_text}` and `{g28_text}` are replaced
/// by [`extraction_prompt`].
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"Extract structured data from passport and G-28 form text.

IMPORTANT: Cross-validate the data. The client name on the G-28 should match
the passport holder name. If they differ, keep the passport values and
describe the discrepancy in validation_notes.

Passport Text:
{passport_text}

G-28 Form Text:
{g28_text}

Return ONLY valid JSON with no additional text, comments, or markdown formatting.

The JSON must have this exact structure:
{
  "passport": {
    "surname": "string or null",
    "given_names": "string or null",
    "middle_names": "string or null",
    "passport_number": "string or null",
    "country_of_issue": "string or null",
    "nationality": "string or null",
    "date_of_birth": "YYYY-MM-DD or null",
    "place_of_birth": "string or null",
    "sex": "M/F/X or null",
    "issue_date": "YYYY-MM-DD or null",
    "expiry_date": "YYYY-MM-DD or null"
  },
  "g28": {
    "attorney": {
      "first_name": "string or null",
      "middle_name": "string or null",
      "last_name": "string or null",
      "street": "string or null",
      "city": "string or null",
      "state": "string or null (use state abbreviation if available)",
      "zip": "string or null",
      "country": "string or null",
      "phone": "string or null",
      "email": "string or null",
      "fax": "string or null",
      "online_account": "string or null"
    },
    "eligibility": {
      "licensing_authority": "string or null",
      "bar_number": "string or null",
      "law_firm": "string or null",
      "is_not_subject_to_orders": true or false or null
    },
    "client": {
      "first_name": "string or null",
      "middle_name": "string or null",
      "last_name": "string or null",
      "street": "string or null",
      "city": "string or null",
      "state": "string or null",
      "zip": "string or null",
      "country": "string or null",
      "phone": "string or null",
      "email": "string or null",
      "a_number": "string or null"
    }
  },
  "validation_notes": "string or null - any discrepancies or validation issues"
}"#;

/// Sent as a follow-up turn when the first answer did not parse.
pub const INVALID_JSON_REMINDER: &str = "Your previous answer was not valid JSON. \
Reply again with ONLY the JSON object described above: no prose, no markdown fences.";

/// Fill a prompt template with both document texts.
///
/// Substitution is single-pass so text containing a literal `{g28_text}`
/// cannot inject into the other slot.
pub fn extraction_prompt(template: &str, passport_text: &str, g28_text: &str) -> String {
    let mut out = String::with_capacity(template.len() + passport_text.len() + g28_text.len());
    let mut rest = template;
    loop {
        let next = [("{passport_text}", passport_text), ("{g28_text}", g28_text)]
            .into_iter()
            .filter_map(|(ph, value)| rest.find(ph).map(|at| (at, ph, value)))
            .min_by_key(|(at, _, _)| *at);
        match next {
            Some((at, ph, value)) => {
                out.push_str(&rest[..at]);
                out.push_str(value);
                rest = &rest[at + ph.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_embeds_both_texts() {
        let p = extraction_prompt(DEFAULT_EXTRACTION_PROMPT, "SMITH JOHN", "Attorney: Jane Roe");
        assert!(p.contains("Passport Text:\nSMITH JOHN"));
        assert!(p.contains("G-28 Form Text:\nAttorney: Jane Roe"));
        assert!(!p.contains("{passport_text}"));
        assert!(!p.contains("{g28_text}"));
    }

    #[test]
    fn schema_lists_every_group() {
        for key in [
            "\"passport\"",
            "\"g28\"",
            "\"attorney\"",
            "\"eligibility\"",
            "\"client\"",
            "\"is_not_subject_to_orders\"",
            "\"validation_notes\"",
        ] {
            assert!(DEFAULT_EXTRACTION_PROMPT.contains(key), "missing {key}");
        }
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let p = extraction_prompt("A={passport_text} B={g28_text}", "{g28_text}", "x");
        assert_eq!(p, "A={g28_text} B=x");
    }
}
