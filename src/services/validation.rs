//! Request body checks shared by the asset pipelines.
//!
//! Bodies stay as untyped JSON objects until every check has passed, so a
//! request is judged on exactly the keys the client sent.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::error::{DomainError, DomainResult};
use crate::database::models::ParentRef;
use crate::types::Noun;

pub type Body = Map<String, Value>;

pub fn into_body(value: Value) -> DomainResult<Body> {
    match value {
        Value::Object(body) => Ok(body),
        _ => Err(DomainError::Validation(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

/// Creation needs every one of `required`; missing names are space-joined
pub fn require_fields(body: &Body, noun: Noun, required: &[&str]) -> DomainResult<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|field| !body.contains_key(*field))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(DomainError::Validation(format!(
        "{} not created. Missing required field(s): {}",
        noun,
        missing.join(" ")
    )))
}

pub fn reject_unknown_on_create(body: &Body, noun: Noun, allowed: &[&str]) -> DomainResult<()> {
    let unknown = keys_outside(body, allowed);
    if unknown.is_empty() {
        return Ok(());
    }
    Err(DomainError::Validation(format!(
        "{} not created. Unknown field(s): {}",
        noun,
        unknown.join(", ")
    )))
}

/// Any key outside the allowlist rejects the whole update; names are comma-joined
pub fn reject_invalid_updates(body: &Body, allowed: &[&str]) -> DomainResult<()> {
    let invalid = keys_outside(body, allowed);
    if invalid.is_empty() {
        return Ok(());
    }
    Err(DomainError::Validation(format!(
        "Attempted to update invalid fields: {}",
        invalid.join(", ")
    )))
}

fn keys_outside<'a>(body: &'a Body, allowed: &[&str]) -> Vec<&'a str> {
    body.keys()
        .map(String::as_str)
        .filter(|key| !allowed.contains(key))
        .collect()
}

/// Client-chosen id on create. Absent means the server generates one.
pub fn requested_id(body: &Body) -> DomainResult<Option<String>> {
    match body.get("id") {
        None => Ok(None),
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(Some(id.clone())),
        Some(_) => Err(DomainError::Validation(
            "id must be a non-empty string".to_string(),
        )),
    }
}

/// Collects every field rule failure before reporting
#[derive(Debug, Default)]
pub struct FieldRules {
    errors: BTreeMap<String, String>,
}

impl FieldRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, field: &str, reason: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| reason.into());
    }

    pub fn string(&mut self, body: &Body, field: &str) -> Option<String> {
        match body.get(field)? {
            Value::String(s) => Some(s.clone()),
            _ => {
                self.fail(field, "must be a string");
                None
            }
        }
    }

    /// A string of at least one non-blank character
    pub fn non_empty_string(&mut self, body: &Body, field: &str) -> Option<String> {
        let value = self.string(body, field)?;
        if value.trim().is_empty() {
            self.fail(field, "must not be empty");
            return None;
        }
        Some(value)
    }

    pub fn non_negative_int(&mut self, body: &Body, field: &str) -> Option<i64> {
        match body.get(field)?.as_i64() {
            Some(n) if n >= 0 => Some(n),
            _ => {
                self.fail(field, "must be an integer >= 0");
                None
            }
        }
    }

    pub fn boolean(&mut self, body: &Body, field: &str) -> Option<bool> {
        match body.get(field)? {
            Value::Bool(b) => Some(*b),
            _ => {
                self.fail(field, "must be a boolean");
                None
            }
        }
    }

    pub fn finish(self) -> DomainResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let fields: Vec<&str> = self.errors.keys().map(String::as_str).collect();
        Err(DomainError::FieldRules {
            message: format!("Validation failed for field(s): {}", fields.join(", ")),
            field_errors: self.errors,
        })
    }
}

pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Shape of a dam/sire value: an object with a string `id`, a string `name`, or both
pub fn parse_parent(value: &Value) -> Result<ParentRef, String> {
    let Value::Object(object) = value else {
        return Err("must be an object with a name or a dog id".to_string());
    };
    let field = |key: &str| -> Result<Option<String>, String> {
        match object.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(format!("{} must be a string", key)),
        }
    };
    Ok(ParentRef {
        id: field("id")?,
        name: field("name")?,
    })
}

pub fn parse_id_list(value: &Value) -> Result<Vec<String>, String> {
    let Value::Array(items) = value else {
        return Err("must be an array of dog ids".to_string());
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(id) => Ok(id.clone()),
            _ => Err("must be an array of dog ids".to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Body {
        into_body(value).unwrap()
    }

    #[test]
    fn missing_fields_are_space_joined() {
        let err = require_fields(&body(json!({"name": "Rex"})), Noun::Litter, &["dam", "breederId"])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "litter not created. Missing required field(s): dam breederId"
        );
    }

    #[test]
    fn invalid_update_fields_are_comma_joined() {
        let err = reject_invalid_updates(&body(json!({"id": "x", "name": "y", "color": "z"})), &["name"])
            .unwrap_err();
        assert_eq!(err.to_string(), "Attempted to update invalid fields: color, id");
    }

    #[test]
    fn field_rules_report_every_offender() {
        let b = body(json!({"count": -1, "weight": "heavy", "name": "ok"}));
        let mut rules = FieldRules::new();
        assert_eq!(rules.non_negative_int(&b, "count"), None);
        assert_eq!(rules.non_negative_int(&b, "weight"), None);
        assert_eq!(rules.string(&b, "name").as_deref(), Some("ok"));
        match rules.finish().unwrap_err() {
            DomainError::FieldRules { field_errors, .. } => {
                assert_eq!(field_errors.len(), 2);
                assert!(field_errors.contains_key("count"));
                assert!(field_errors.contains_key("weight"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("fred@astaire.com"));
        assert!(!is_valid_email("fred"));
        assert!(!is_valid_email("fred@local"));
        assert!(!is_valid_email("fr ed@astaire.com"));
        assert!(!is_valid_email("@astaire.com"));
    }

    #[test]
    fn parent_shapes() {
        let parent = parse_parent(&json!({"name": "Bella"})).unwrap();
        assert_eq!(parent.name.as_deref(), Some("Bella"));
        assert!(parent.id.is_none());
        assert!(parse_parent(&json!("Bella")).is_err());
        assert!(parse_parent(&json!({"name": 12})).is_err());
    }

    #[test]
    fn requested_ids() {
        assert_eq!(requested_id(&body(json!({}))).unwrap(), None);
        assert_eq!(requested_id(&body(json!({"id": "d1"}))).unwrap().as_deref(), Some("d1"));
        assert!(requested_id(&body(json!({"id": 5}))).is_err());
    }
}
