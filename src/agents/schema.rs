use crate::error::{Error, Result};
use crate::model::extract_json;
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::String => "str",
            Self::Integer => "int",
            Self::Number => "float",
            Self::Boolean => "bool",
        }
    }

    fn gemini_type(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Number => "NUMBER",
            Self::Boolean => "BOOLEAN",
        }
    }
}

/// Flat JSON object shape an agent's reply must match exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    name: String,
    fields: Vec<(String, FieldType)>,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push((name.into(), ty));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::schema(format!("{}: expected a JSON object", self.name)))?;

        for (field, ty) in &self.fields {
            match obj.get(field) {
                None => {
                    return Err(Error::schema(format!("{}: missing field '{field}'", self.name)));
                }
                Some(v) if !ty.matches(v) => {
                    return Err(Error::schema(format!(
                        "{}: field '{field}' must be {}",
                        self.name,
                        ty.label()
                    )));
                }
                Some(_) => {}
            }
        }
        if let Some(extra) = obj.keys().find(|k| !self.fields.iter().any(|(f, _)| f == *k)) {
            return Err(Error::schema(format!("{}: unexpected field '{extra}'", self.name)));
        }
        Ok(())
    }

    /// Pull the JSON object out of model text and validate it.
    pub fn parse(&self, text: &str) -> Result<Value> {
        let value: Value = serde_json::from_str(extract_json(text))
            .map_err(|e| Error::schema(format!("{}: invalid JSON: {e}", self.name)))?;
        self.validate(&value)?;
        Ok(value)
    }

    /// Gemini `responseSchema` form.
    pub fn to_response_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(f, ty)| (f.clone(), json!({ "type": ty.gemini_type() })))
            .collect();
        let required: Vec<&str> = self.fields.iter().map(|(f, _)| f.as_str()).collect();
        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": required,
            "propertyOrdering": required,
        })
    }
}
