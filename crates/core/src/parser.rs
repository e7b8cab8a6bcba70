use crate::error::{IngestError, ParseStage};
use crate::generation::GenerationOptions;
use crate::models::{Education, Project, ResumeProfile, WorkExperience};
use crate::traits::GenerativeModel;
use regex::Regex;
use serde_json::{Map, Value};

const PROFILE_SCHEMA: &str = r#"{
  "name": "string",
  "email": "string",
  "phone": "string",
  "summary": "string",
  "skills": ["string"],
  "work_experience": [{"company": "string", "title": "string", "start_date": "string", "end_date": "string", "description": "string"}],
  "education": [{"institution": "string", "degree": "string", "graduation_date": "string"}],
  "projects": [{"name": "string", "description": "string"}]
}"#;

pub fn build_parse_prompt(resume_text: &str) -> String {
    format!(
        "You are an expert HR resume parser. Extract the candidate profile from the resume text \
         below and return only a valid JSON object matching this exact schema:\n\
         {PROFILE_SCHEMA}\n\
         Use an empty string \"\" or an empty list [] for any field that is missing. \
         Do not add fields, comments, or explanations.\n\n\
         RESUME TEXT:\n---\n{resume_text}\n---\n\nJSON OUTPUT:\n"
    )
}

/// Sends the extracted resume text through the generative model and decodes
/// the reply into a profile. A failure here is fatal for the document; the
/// same prompt is never retried.
pub async fn parse_profile(
    model: &dyn GenerativeModel,
    resume_text: &str,
) -> Result<ResumeProfile, IngestError> {
    let prompt = build_parse_prompt(resume_text);
    let reply = model
        .generate(&prompt, &GenerationOptions::deterministic_json())
        .await?;
    profile_from_reply(&reply)
}

/// Decodes a model reply into a profile, tolerating fences, prose around the
/// object, typographic quotes, and a single-element list wrapper.
pub fn profile_from_reply(reply: &str) -> Result<ResumeProfile, IngestError> {
    let extracted = extract_json_candidate(reply);
    let value = parse_json_value(extracted)?;
    let object = unwrap_profile_object(value)?;
    Ok(profile_from_object(&object))
}

/// Same extraction pipeline without the profile shaping, for callers that
/// want the decoded JSON value.
pub(crate) fn value_from_reply(reply: &str) -> Result<Value, IngestError> {
    parse_json_value(extract_json_candidate(reply))
}

fn extract_json_candidate(reply: &str) -> &str {
    let candidate = fenced_block(reply).unwrap_or(reply);
    first_balanced_object(candidate).unwrap_or_else(|| candidate.trim())
}

fn fenced_block(reply: &str) -> Option<&str> {
    let fence = Regex::new(r"(?is)```(?:json)?\s*(.*?)\s*```").ok()?;
    fence
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|inner| inner.as_str())
}

/// Returns the minimal balanced `{...}` object starting at the first brace.
/// Braces inside double-quoted strings never affect the depth counter, and
/// backslash escapes inside strings are respected.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_json_value(extracted: &str) -> Result<Value, IngestError> {
    match serde_json::from_str(extracted) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            let normalized = normalize_typographic_quotes(extracted);
            if normalized != extracted {
                if let Ok(value) = serde_json::from_str(&normalized) {
                    return Ok(value);
                }
            }
            let offset = char_offset(extracted, first_error.line(), first_error.column());
            Err(IngestError::Parse {
                stage: ParseStage::JsonDecode,
                detail: format!(
                    "{first_error}; near: {:?}",
                    excerpt_around(extracted, offset)
                ),
            })
        }
    }
}

fn normalize_typographic_quotes(text: &str) -> String {
    text.replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

fn char_offset(text: &str, line: usize, column: usize) -> usize {
    let mut current_line = 1;
    let mut offset = 0;
    for ch in text.chars() {
        if current_line == line {
            break;
        }
        offset += 1;
        if ch == '\n' {
            current_line += 1;
        }
    }
    offset + column.saturating_sub(1)
}

fn excerpt_around(text: &str, offset: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let center = offset.min(chars.len());
    let start = center.saturating_sub(50);
    let end = (center + 50).min(chars.len());
    chars[start..end].iter().collect()
}

fn unwrap_profile_object(value: Value) -> Result<Map<String, Value>, IngestError> {
    let unwrapped = match value {
        Value::Array(items) if items.first().map(Value::is_object).unwrap_or(false) => {
            items.into_iter().next().unwrap_or(Value::Null)
        }
        other => other,
    };
    match unwrapped {
        Value::Object(object) => Ok(object),
        other => Err(IngestError::Parse {
            stage: ParseStage::Shape,
            detail: format!("expected a JSON object, got {}", json_type_name(&other)),
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// Field-level leniency: a missing or wrong-typed field collapses to its
// empty default instead of failing the document.
fn profile_from_object(object: &Map<String, Value>) -> ResumeProfile {
    ResumeProfile {
        name: string_field(object, "name"),
        email: string_field(object, "email"),
        phone: string_field(object, "phone"),
        summary: string_field(object, "summary"),
        skills: string_list(object, "skills"),
        work_experience: object_list(object, "work_experience", |entry| WorkExperience {
            company: string_field(entry, "company"),
            title: string_field(entry, "title"),
            start_date: string_field(entry, "start_date"),
            end_date: string_field(entry, "end_date"),
            description: string_field(entry, "description"),
        }),
        education: object_list(object, "education", |entry| Education {
            institution: string_field(entry, "institution"),
            degree: string_field(entry, "degree"),
            graduation_date: string_field(entry, "graduation_date"),
        }),
        projects: object_list(object, "projects", |entry| Project {
            name: string_field(entry, "name"),
            description: string_field(entry, "description"),
        }),
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn string_list(object: &Map<String, Value>, key: &str) -> Vec<String> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn object_list<T>(
    object: &Map<String, Value>,
    key: &str,
    build: impl Fn(&Map<String, Value>) -> T,
) -> Vec<T> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(&build)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use async_trait::async_trait;

    #[test]
    fn balanced_object_ignores_braces_inside_strings() {
        let input = r#"Here is data: {"a": "contains a } brace", "b": [1,2]} trailing text"#;
        assert_eq!(
            first_balanced_object(input),
            Some(r#"{"a": "contains a } brace", "b": [1,2]}"#)
        );
    }

    #[test]
    fn balanced_object_respects_escaped_quotes() {
        let input = r#"noise {"a": "quote \" then } brace", "b": 2} tail"#;
        assert_eq!(
            first_balanced_object(input),
            Some(r#"{"a": "quote \" then } brace", "b": 2}"#)
        );
    }

    #[test]
    fn unterminated_object_yields_none() {
        assert_eq!(first_balanced_object(r#"{"a": 1"#), None);
        assert_eq!(first_balanced_object("no braces here"), None);
    }

    #[test]
    fn fenced_block_wins_over_surrounding_prose() {
        let reply = "Sure, here you go:\n```json\n{\"name\": \"Ada\"}\n```\nHope that helps!";
        let profile = profile_from_reply(reply).expect("fenced reply should parse");
        assert_eq!(profile.name, "Ada");
    }

    #[test]
    fn untagged_fence_is_accepted() {
        let reply = "```\n{\"name\": \"Lin\"}\n```";
        let profile = profile_from_reply(reply).expect("untagged fence should parse");
        assert_eq!(profile.name, "Lin");
    }

    #[test]
    fn typographic_quotes_are_normalized_on_retry() {
        let reply = "{\u{201C}name\u{201D}: \u{201C}Grace\u{201D}}";
        let profile = profile_from_reply(reply).expect("smart quotes should be repaired");
        assert_eq!(profile.name, "Grace");
    }

    #[test]
    fn decode_failure_reports_stage_and_excerpt() {
        let reply = r#"{"name": "Ada", "skills": [unquoted]}"#;
        let error = profile_from_reply(reply).expect_err("invalid json should fail");
        match error {
            IngestError::Parse { stage, detail } => {
                assert_eq!(stage, ParseStage::JsonDecode);
                assert!(detail.contains("near:"), "missing excerpt in {detail}");
                assert!(detail.contains("unquoted"), "excerpt should show the bad token");
            }
            other => panic!("expected json_decode parse error, got {other}"),
        }
    }

    #[test]
    fn list_wrapped_object_unwraps_to_first_element() {
        let reply = r#"[{"name": "Joan"}, {"name": "Shadow"}]"#;
        let profile = profile_from_reply(reply).expect("list wrapper should unwrap");
        assert_eq!(profile.name, "Joan");
    }

    #[test]
    fn non_object_reply_is_a_shape_error() {
        let error = profile_from_reply("[1, 2, 3]").expect_err("scalar list should fail");
        match error {
            IngestError::Parse { stage, .. } => assert_eq!(stage, ParseStage::Shape),
            other => panic!("expected shape parse error, got {other}"),
        }
    }

    #[test]
    fn wrong_typed_fields_fall_back_to_defaults() {
        let reply = r#"{
            "name": 42,
            "summary": "Systems engineer",
            "skills": ["rust", 7, "sql"],
            "work_experience": [{"company": "Acme", "title": null}, "not an entry"],
            "education": {"institution": "wrong shape"}
        }"#;
        let profile = profile_from_reply(reply).expect("lenient parse should succeed");
        assert_eq!(profile.name, "");
        assert_eq!(profile.summary, "Systems engineer");
        assert_eq!(profile.skills, vec!["rust".to_string(), "sql".to_string()]);
        assert_eq!(profile.work_experience.len(), 1);
        assert_eq!(profile.work_experience[0].company, "Acme");
        assert_eq!(profile.work_experience[0].title, "");
        assert!(profile.education.is_empty());
    }

    #[test]
    fn prompt_embeds_schema_and_resume_text() {
        let prompt = build_parse_prompt("Jane Doe, 10 years of Rust");
        assert!(prompt.contains("\"work_experience\""));
        assert!(prompt.contains("Jane Doe, 10 years of Rust"));
        assert!(prompt.contains("only a valid JSON object"));
    }

    struct CannedModel {
        reply: String,
    }

    #[async_trait]
    impl GenerativeModel for CannedModel {
        async fn generate(
            &self,
            _prompt: &str,
            options: &GenerationOptions,
        ) -> Result<String, BackendError> {
            assert_eq!(options.temperature, 0.0);
            assert!(options.json_response);
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn parse_profile_drives_the_model_deterministically() {
        let model = CannedModel {
            reply: "```json\n{\"name\": \"Sam\", \"skills\": [\"go\", \"rust\"]}\n```".to_string(),
        };
        let profile = parse_profile(&model, "Sam. Go and Rust.")
            .await
            .expect("canned reply should parse");
        assert_eq!(profile.name, "Sam");
        assert_eq!(profile.skills.len(), 2);
    }
}
