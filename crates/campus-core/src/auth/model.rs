//! Credentials, signup requests and backend account views.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::error::AuthError;
use crate::session::Role;

/// How the user identifies themselves to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contact {
    Email(String),
    Phone(String),
}

impl Contact {
    fn value(&self) -> &str {
        match self {
            Contact::Email(v) | Contact::Phone(v) => v,
        }
    }
}

/// Login credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub role: Role,
    pub contact: Contact,
    pub password: String,
}

impl Credentials {
    pub fn new(role: Role, contact: Contact, password: impl Into<String>) -> Self {
        Self {
            role,
            contact,
            password: password.into(),
        }
    }

    /// Students sign in by email.
    pub fn student(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(Role::Student, Contact::Email(email.into()), password)
    }

    /// Drivers sign in by phone.
    pub fn driver(phone: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(Role::Driver, Contact::Phone(phone.into()), password)
    }

    pub fn admin(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(Role::Admin, Contact::Email(email.into()), password)
    }

    /// Checks required fields before anything is sent.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.password.is_empty() {
            return Err(AuthError::validation("Please fill in all required fields."));
        }
        match (&self.contact, self.role.signs_in_with_phone()) {
            (Contact::Phone(_), true) | (Contact::Email(_), false) => {}
            (_, true) => {
                return Err(AuthError::validation(format!(
                    "Phone is required for {}.",
                    self.role
                )));
            }
            (_, false) => {
                return Err(AuthError::validation(format!(
                    "Email is required for {}.",
                    self.role
                )));
            }
        }
        if self.contact.value().trim().is_empty() {
            let field = if self.role.signs_in_with_phone() {
                "Phone"
            } else {
                "Email"
            };
            return Err(AuthError::validation(format!(
                "{field} is required for {}.",
                self.role
            )));
        }
        Ok(())
    }

    /// Request body for `/login` and `/signup`.
    pub fn to_payload<'a>(&'a self, name: Option<&'a str>) -> AuthPayload<'a> {
        let (email, phone) = match &self.contact {
            Contact::Email(e) => (Some(e.as_str()), None),
            Contact::Phone(p) => (None, Some(p.as_str())),
        };
        AuthPayload {
            role: self.role,
            email,
            phone,
            password: &self.password,
            name,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("role", &self.role)
            .field("contact", &self.contact)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Account creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupRequest {
    pub name: String,
    pub credentials: Credentials,
}

impl SignupRequest {
    pub fn new(name: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            name: name.into(),
            credentials,
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        self.credentials.validate()?;
        if self.name.trim().is_empty() {
            return Err(AuthError::validation("Name is required for signup."));
        }
        Ok(())
    }

    pub fn to_payload(&self) -> AuthPayload<'_> {
        self.credentials.to_payload(Some(&self.name))
    }
}

/// JSON body `{role, email|phone, password, name?}`.
#[derive(Serialize)]
pub struct AuthPayload<'a> {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<&'a str>,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
}

/// Account details returned by `/profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Email if present, otherwise phone.
    pub fn contact(&self) -> Option<&str> {
        self.email.as_deref().or(self.phone.as_deref())
    }
}

/// One signed-in device as reported by `/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSession {
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_active: Option<DateTime<Utc>>,
}

/// Accepts RFC 3339, a zone-less ISO string (read as UTC) or epoch
/// milliseconds. Anything else becomes `None` instead of failing the response.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(text)) => parse_timestamp(&text),
        Some(Value::Number(n)) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    })
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}
