//! Input validation for form submissions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Maximum length of the contact name
const MAX_NAME_LENGTH: usize = 200;

/// Bounds on the number of digits in a phone number
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 20;

/// Contact form submission
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

/// Input validator
pub struct InputValidator;

impl InputValidator {
    /// Decode a contact submission sent as JSON or as an urlencoded form.
    ///
    /// The content type picks the decoder. Without one, JSON is tried first.
    pub fn parse_contact(
        content_type: Option<&str>,
        body: &[u8],
    ) -> Result<ContactRequest, ValidationError> {
        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());

        let decoded = match mime.as_deref() {
            Some("application/x-www-form-urlencoded") => Self::decode_form(body),
            Some(ct) if ct == "application/json" || ct.ends_with("+json") => Self::decode_json(body),
            Some(ct) => Err(ValidationError::MalformedBody(format!(
                "Unsupported content type '{}'",
                ct
            ))),
            None => Self::decode_json(body).or_else(|_| Self::decode_form(body)),
        };

        if let Err(e) = &decoded {
            warn!(content_type = mime.as_deref(), error = %e, "Validation failed: undecodable body");
        }
        decoded
    }

    fn decode_json(body: &[u8]) -> Result<ContactRequest, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ContactRequest::default());
        }
        serde_json::from_slice(body).map_err(|e| ValidationError::MalformedBody(e.to_string()))
    }

    fn decode_form(body: &[u8]) -> Result<ContactRequest, ValidationError> {
        serde_urlencoded::from_bytes(body).map_err(|e| ValidationError::MalformedBody(e.to_string()))
    }

    /// Validate and normalize a contact submission
    pub fn validate_contact(request: &ContactRequest) -> Result<ContactRequest, ValidationError> {
        let name = Self::sanitize_text(&request.name);
        let phone = Self::sanitize_text(&request.phone);

        Self::validate_text("name", &name, MAX_NAME_LENGTH)?;
        Self::validate_phone(&phone)?;

        debug!("Contact submission validation passed");
        Ok(ContactRequest { name, phone })
    }

    /// Validate a required free-text field. Expects sanitized input.
    pub fn validate_text(field: &str, text: &str, max_length: usize) -> Result<(), ValidationError> {
        if text.trim().is_empty() {
            warn!(field, "Validation failed: empty field");
            return Err(ValidationError::Required {
                field: field.to_string(),
            });
        }

        let length = text.chars().count();
        if length > max_length {
            warn!(field, length, max_length, "Validation failed: field too long");
            return Err(ValidationError::TooLong {
                field: field.to_string(),
                length,
                max_length,
            });
        }

        Ok(())
    }

    /// Validate a phone number: digits plus `+ - . ( )` and spaces
    pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
        if phone.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "phone".to_string(),
            });
        }

        let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | '(' | ')' | ' ');
        if !phone.chars().all(allowed) {
            warn!("Validation failed: phone contains invalid characters");
            return Err(ValidationError::InvalidPhone);
        }

        let digits = phone.chars().filter(char::is_ascii_digit).count();
        if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
            warn!(digits, "Validation failed: phone has wrong number of digits");
            return Err(ValidationError::InvalidPhone);
        }

        Ok(())
    }

    /// Strip control characters (except whitespace) and trim
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || c.is_whitespace())
            .collect::<String>()
            .trim()
            .to_string()
    }
}

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' is too long: {length} characters (max: {max_length})")]
    TooLong {
        field: String,
        length: usize,
        max_length: usize,
    },

    #[error("Invalid phone number")]
    InvalidPhone,

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Invalid host header: {0}")]
    InvalidHost(String),
}

impl ValidationError {
    /// Field the error refers to, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. } => Some(field),
            ValidationError::InvalidPhone => Some("phone"),
            ValidationError::InvalidHost(_) => Some("host"),
            ValidationError::MalformedBody(_) => None,
        }
    }

    pub fn details(&self) -> Option<Map<String, Value>> {
        let field = self.field()?;
        let mut details = Map::new();
        details.insert("field".to_string(), Value::from(field));
        Some(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(name: &str, phone: &str) -> ContactRequest {
        ContactRequest {
            name: name.to_string(),
            phone: phone.to_string(),
        }
    }

    #[test]
    fn test_validate_contact_success() {
        let valid = InputValidator::validate_contact(&contact("  Ada Lovelace ", "+1 (555) 123-4567"))
            .unwrap();
        assert_eq!(valid.name, "Ada Lovelace");
        assert_eq!(valid.phone, "+1 (555) 123-4567");
    }

    #[test]
    fn test_validate_contact_missing_fields() {
        assert_eq!(
            InputValidator::validate_contact(&contact("", "5551234567")),
            Err(ValidationError::Required { field: "name".into() })
        );
        assert_eq!(
            InputValidator::validate_contact(&contact("Ada", "   ")),
            Err(ValidationError::Required { field: "phone".into() })
        );
    }

    #[test]
    fn test_validate_name_too_long() {
        let long_name = "a".repeat(MAX_NAME_LENGTH + 1);
        let err = InputValidator::validate_contact(&contact(&long_name, "5551234567")).unwrap_err();
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn test_validate_phone() {
        assert!(InputValidator::validate_phone("555-123-4567").is_ok());
        assert!(InputValidator::validate_phone("+44 20 7946 0958").is_ok());
        assert!(InputValidator::validate_phone("12345").is_err());
        assert!(InputValidator::validate_phone("call me maybe").is_err());
        assert!(InputValidator::validate_phone(&"1".repeat(MAX_PHONE_DIGITS + 1)).is_err());
    }

    #[test]
    fn test_sanitize_text() {
        let text = "Hello\x00World\x01!";
        assert_eq!(InputValidator::sanitize_text(text), "HelloWorld!");
    }

    #[test]
    fn test_control_characters_are_stripped_not_rejected() {
        let valid = InputValidator::validate_contact(&contact("Ada\x07 Lovelace\x00", "555\x1b-123-4567"))
            .unwrap();
        assert_eq!(valid.name, "Ada Lovelace");
        assert_eq!(valid.phone, "555-123-4567");

        // Nothing but control characters is an empty field
        assert_eq!(
            InputValidator::validate_contact(&contact("\x00\x01", "5551234567")),
            Err(ValidationError::Required { field: "name".into() })
        );
    }

    #[test]
    fn test_parse_contact_json_and_form() {
        let json = InputValidator::parse_contact(
            Some("application/json; charset=utf-8"),
            br#"{"name":"Ada","phone":"555-123-4567"}"#,
        )
        .unwrap();
        assert_eq!(json.name, "Ada");

        let form = InputValidator::parse_contact(
            Some("application/x-www-form-urlencoded"),
            b"name=Ada+Lovelace&phone=%2B1+555-123-4567",
        )
        .unwrap();
        assert_eq!(form.name, "Ada Lovelace");
        assert_eq!(form.phone, "+1 555-123-4567");

        let guessed = InputValidator::parse_contact(None, b"name=Ada&phone=555-123-4567").unwrap();
        assert_eq!(guessed.phone, "555-123-4567");

        // Missing fields decode as empty and fail validation later
        let partial =
            InputValidator::parse_contact(Some("application/x-www-form-urlencoded"), b"name=Ada")
                .unwrap();
        assert!(partial.phone.is_empty());
        assert!(InputValidator::parse_contact(Some("application/json"), b"").unwrap().name.is_empty());
    }

    #[test]
    fn test_parse_contact_rejects_bad_bodies() {
        assert!(matches!(
            InputValidator::parse_contact(Some("application/json"), b"{not json"),
            Err(ValidationError::MalformedBody(_))
        ));
        assert!(matches!(
            InputValidator::parse_contact(Some("text/plain"), b"name=Ada"),
            Err(ValidationError::MalformedBody(_))
        ));
        assert!(matches!(
            InputValidator::parse_contact(Some("application/json"), br#"{"name": 5}"#),
            Err(ValidationError::MalformedBody(_))
        ));
    }

    #[test]
    fn test_details() {
        let details = ValidationError::InvalidPhone.details().unwrap();
        assert_eq!(details["field"], "phone");
        assert!(ValidationError::MalformedBody("eof".into()).details().is_none());
        assert_eq!(ValidationError::InvalidHost("evil.test".into()).details().unwrap()["field"], "host");
    }
}
