//! Declared parameter schemas and the generic field-rule validator.
//!
//! A schema is a closed set of [`FieldRule`] records keyed by field name.
//! Fields are visited in name order so the reported violation is stable.

use std::borrow::Cow;
use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON type tag a field is declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// Accepts any JSON value.
    Any,
}

impl FieldType {
    /// Whether `value` is compatible with this type tag.
    ///
    /// Integers accept floats with no fractional part (`3.0`), since JSON
    /// producers do not always preserve the distinction.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().map_or(false, |f| f.fract() == 0.0)
            }
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Any => "any",
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Number)
    }
}

/// Rule for a single declared field.
///
/// Example YAML:
/// ```yaml
/// layout:
///   type: string
///   required: true
///   enum: ["pyramid", "funnel"]
/// count:
///   type: integer
///   minimum: 3
///   maximum: 6
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Regex the whole string value must match somewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip)]
    compiled: PatternCache,
}

/// Compiled `pattern`, built on first use.
#[derive(Debug, Clone, Default)]
struct PatternCache(OnceCell<Regex>);

impl PartialEq for PatternCache {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl PatternCache {
    /// A `pattern` edited after the first compile is compiled uncached.
    fn regex(&self, pattern: &str) -> Result<Cow<'_, Regex>, regex::Error> {
        let cached = self.0.get_or_try_init(|| Regex::new(pattern))?;
        if cached.as_str() == pattern {
            Ok(Cow::Borrowed(cached))
        } else {
            Regex::new(pattern).map(Cow::Owned)
        }
    }

    #[cfg(test)]
    fn is_compiled(&self) -> bool {
        self.0.get().is_some()
    }
}

impl FieldRule {
    /// A rule with only a type tag set.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            enum_values: None,
            minimum: None,
            maximum: None,
            max_length: None,
            pattern: None,
            description: None,
            compiled: PatternCache::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self.compiled = PatternCache::default();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check a provided value against this rule. Returns the violation message.
    fn check(&self, value: &Value) -> Result<(), String> {
        if !self.field_type.accepts(value) {
            return Err(format!(
                "expected {}, got {}",
                self.field_type.as_str(),
                json_type_name(value)
            ));
        }

        if let Some(n) = value.as_f64().filter(|_| self.field_type.is_numeric()) {
            if let Some(min) = self.minimum {
                if n < min {
                    return Err(format!("value {} is below minimum {}", n, min));
                }
            }
            if let Some(max) = self.maximum {
                if n > max {
                    return Err(format!("value {} is above maximum {}", n, max));
                }
            }
        }

        if let Some(s) = value.as_str() {
            if let Some(max_len) = self.max_length {
                let len = s.chars().count();
                if len > max_len {
                    return Err(format!(
                        "length {} exceeds max_length {}",
                        len, max_len
                    ));
                }
            }
            if let Some(pattern) = &self.pattern {
                let re = self
                    .compiled
                    .regex(pattern)
                    .map_err(|e| format!("invalid pattern '{}': {}", pattern, e))?;
                if !re.is_match(s) {
                    return Err(format!("value does not match pattern '{}'", pattern));
                }
            }
        }

        if let Some(allowed) = &self.enum_values {
            if !allowed.contains(value) {
                return Err(format!(
                    "value {} is not one of {}",
                    value,
                    Value::Array(allowed.clone())
                ));
            }
        }

        Ok(())
    }

    /// Internal consistency of the rule itself.
    fn check_consistency(&self) -> Result<(), String> {
        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if min > max {
                return Err(format!("minimum {} is greater than maximum {}", min, max));
            }
        }
        if (self.minimum.is_some() || self.maximum.is_some()) && !self.field_type.is_numeric() {
            return Err(format!(
                "numeric bounds declared on {} field",
                self.field_type.as_str()
            ));
        }
        if self.field_type != FieldType::String {
            if self.max_length.is_some() {
                return Err(format!(
                    "max_length declared on {} field",
                    self.field_type.as_str()
                ));
            }
            if self.pattern.is_some() {
                return Err(format!(
                    "pattern declared on {} field",
                    self.field_type.as_str()
                ));
            }
        }
        if let Some(pattern) = &self.pattern {
            self.compiled
                .regex(pattern)
                .map_err(|e| format!("pattern '{}' does not compile: {}", pattern, e))?;
        }
        if let Some(values) = &self.enum_values {
            if values.is_empty() {
                return Err("enum is empty".to_string());
            }
            if let Some(bad) = values.iter().find(|v| !self.field_type.accepts(v)) {
                return Err(format!(
                    "enum value {} is not a {}",
                    bad,
                    self.field_type.as_str()
                ));
            }
        }
        Ok(())
    }
}

/// A schema violation: the first offending field and what was wrong with it.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    pub field: String,
    pub message: String,
}

/// Declared field rules, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSchema {
    pub fields: BTreeMap<String, FieldRule>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field declaration.
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, rule)| rule.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate `params` and return the first violation.
    ///
    /// Required fields are checked first (a `null` counts as missing), then
    /// every provided declared field is checked against its rule. Undeclared
    /// extra parameters are tolerated.
    pub fn validate(&self, params: &Map<String, Value>) -> Result<(), SchemaViolation> {
        for (name, rule) in &self.fields {
            if rule.required && params.get(name).map_or(true, Value::is_null) {
                return Err(SchemaViolation {
                    field: name.clone(),
                    message: "required field is missing".to_string(),
                });
            }
        }

        for (name, rule) in &self.fields {
            match params.get(name) {
                None | Some(Value::Null) => continue,
                Some(value) => rule.check(value).map_err(|message| SchemaViolation {
                    field: name.clone(),
                    message,
                })?,
            }
        }

        Ok(())
    }

    /// Check every rule for internal consistency.
    pub fn check_consistency(&self) -> Result<(), SchemaViolation> {
        for (name, rule) in &self.fields {
            rule.check_consistency().map_err(|message| SchemaViolation {
                field: name.clone(),
                message,
            })?;
        }
        Ok(())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
