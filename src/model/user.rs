//! Users
//!
//! A [`User`] is the principal a flag is evaluated against. The only required
//! attribute is `key`; the built-in optional attributes mirror the wire schema
//! and anything else lives in the `custom` map. Attribute lookup by name is
//! used by rule clauses and rollout bucketing, with built-ins taking precedence
//! over custom attributes of the same name.

use super::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An identified principal for flag evaluation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    /// Unique key for this user; must be non-empty for evaluation
    pub key: String,

    /// Secondary key, mixed into rollout bucketing when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,

    /// IP address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Two-letter country code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Email address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// First name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Last name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Avatar URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    /// Full name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Whether the user is anonymous
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous: Option<bool>,

    /// Custom attributes
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, Value>,
}

impl User {
    /// Create a user with the given key and no other attributes
    pub fn with_key(key: impl Into<String>) -> Self {
        User {
            key: key.into(),
            ..User::default()
        }
    }

    /// Start building a user with the given key
    pub fn builder(key: impl Into<String>) -> UserBuilder {
        UserBuilder::new(key)
    }

    /// Look up an attribute by name
    ///
    /// Built-in attributes take precedence over custom attributes. Returns
    /// `None` when the attribute is not set on this user.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            "key" => Some(Value::String(self.key.clone())),
            "secondary" => self.secondary.clone().map(Value::String),
            "ip" => self.ip.clone().map(Value::String),
            "country" => self.country.clone().map(Value::String),
            "email" => self.email.clone().map(Value::String),
            "firstName" => self.first_name.clone().map(Value::String),
            "lastName" => self.last_name.clone().map(Value::String),
            "avatar" => self.avatar.clone().map(Value::String),
            "name" => self.name.clone().map(Value::String),
            "anonymous" => self.anonymous.map(Value::Bool),
            _ => self.custom.get(name).cloned(),
        }
    }
}

/// Chainable builder for [`User`]
#[derive(Debug, Clone)]
pub struct UserBuilder {
    user: User,
}

impl UserBuilder {
    /// Create a builder for a user with the given key
    pub fn new(key: impl Into<String>) -> Self {
        UserBuilder {
            user: User::with_key(key),
        }
    }

    /// Set the secondary key
    pub fn secondary(mut self, value: impl Into<String>) -> Self {
        self.user.secondary = Some(value.into());
        self
    }

    /// Set the IP address
    pub fn ip(mut self, value: impl Into<String>) -> Self {
        self.user.ip = Some(value.into());
        self
    }

    /// Set the country code
    pub fn country(mut self, value: impl Into<String>) -> Self {
        self.user.country = Some(value.into());
        self
    }

    /// Set the email address
    pub fn email(mut self, value: impl Into<String>) -> Self {
        self.user.email = Some(value.into());
        self
    }

    /// Set the first name
    pub fn first_name(mut self, value: impl Into<String>) -> Self {
        self.user.first_name = Some(value.into());
        self
    }

    /// Set the last name
    pub fn last_name(mut self, value: impl Into<String>) -> Self {
        self.user.last_name = Some(value.into());
        self
    }

    /// Set the avatar URL
    pub fn avatar(mut self, value: impl Into<String>) -> Self {
        self.user.avatar = Some(value.into());
        self
    }

    /// Set the full name
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.user.name = Some(value.into());
        self
    }

    /// Mark the user as anonymous or not
    pub fn anonymous(mut self, value: bool) -> Self {
        self.user.anonymous = Some(value);
        self
    }

    /// Set a custom attribute
    pub fn custom(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.user.custom.insert(name.into(), value.into());
        self
    }

    /// Finish building
    pub fn build(self) -> User {
        self.user
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_attribute_lookup() {
        let user = User::builder("u1")
            .email("u1@example.com")
            .country("DE")
            .anonymous(true)
            .build();
        assert_eq!(user.attribute("key"), Some(Value::String("u1".into())));
        assert_eq!(
            user.attribute("email"),
            Some(Value::String("u1@example.com".into()))
        );
        assert_eq!(user.attribute("anonymous"), Some(Value::Bool(true)));
        assert_eq!(user.attribute("name"), None);
    }

    #[test]
    fn test_builtins_shadow_custom() {
        let user = User::builder("u1")
            .email("real@example.com")
            .custom("email", "fake@example.com")
            .custom("plan", "enterprise")
            .build();
        assert_eq!(
            user.attribute("email"),
            Some(Value::String("real@example.com".into()))
        );
        assert_eq!(
            user.attribute("plan"),
            Some(Value::String("enterprise".into()))
        );
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let user = User::builder("u1").first_name("Ada").build();
        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("\"firstName\":\"Ada\""));
        let back: User = serde_json::from_str(&json).unwrap();
        assert_eq!(back, user);
    }
}
