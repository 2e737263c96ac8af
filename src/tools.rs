//! Function tools offered to the wellness assistant.

use crate::agents::FunctionTool;
use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::{Value, json};

const LB_PER_KG: f64 = 2.204_622_621_8;

#[derive(Deserialize)]
struct BmiArgs {
    weight_kg: f64,
    height_m: f64,
}

#[derive(Deserialize)]
struct ConvertArgs {
    value: f64,
    from: String,
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| Error::tool(tool, format!("invalid arguments: {e}")))
}

fn bmi_category(bmi: f64) -> &'static str {
    match bmi {
        b if b < 18.5 => "underweight",
        b if b < 25.0 => "normal",
        b if b < 30.0 => "overweight",
        _ => "obese",
    }
}

pub fn calculate_bmi(args: Value) -> Result<Value> {
    let BmiArgs { weight_kg, height_m } = parse_args("calculate_bmi", args)?;
    if !(weight_kg.is_finite() && weight_kg > 0.0) {
        return Err(Error::tool("calculate_bmi", "weight_kg must be a positive number"));
    }
    if !(height_m.is_finite() && height_m > 0.0) {
        return Err(Error::tool("calculate_bmi", "height_m must be a positive number"));
    }
    let bmi = weight_kg / (height_m * height_m);
    let rounded = (bmi * 10.0).round() / 10.0;
    Ok(json!({ "bmi": rounded, "category": bmi_category(bmi) }))
}

pub fn convert_weight(args: Value) -> Result<Value> {
    let ConvertArgs { value, from } = parse_args("convert_weight", args)?;
    if !value.is_finite() || value < 0.0 {
        return Err(Error::tool("convert_weight", "value must be a non-negative number"));
    }
    let (converted, unit) = match from.trim().to_ascii_lowercase().as_str() {
        "kg" => (value * LB_PER_KG, "lb"),
        "lb" | "lbs" => (value / LB_PER_KG, "kg"),
        other => {
            return Err(Error::tool(
                "convert_weight",
                format!("unknown unit '{other}', expected kg or lb"),
            ));
        }
    };
    Ok(json!({ "value": (converted * 100.0).round() / 100.0, "unit": unit }))
}

pub fn bmi_tool() -> FunctionTool {
    FunctionTool::new(
        "calculate_bmi",
        "Compute body-mass index from weight in kilograms and height in metres.",
        json!({
            "type": "object",
            "properties": {
                "weight_kg": {"type": "number", "description": "Body weight in kilograms"},
                "height_m": {"type": "number", "description": "Height in metres"}
            },
            "required": ["weight_kg", "height_m"]
        }),
        |args| async move { calculate_bmi(args) },
    )
}

pub fn weight_tool() -> FunctionTool {
    FunctionTool::new(
        "convert_weight",
        "Convert a weight between kilograms and pounds.",
        json!({
            "type": "object",
            "properties": {
                "value": {"type": "number"},
                "from": {"type": "string", "enum": ["kg", "lb"]}
            },
            "required": ["value", "from"]
        }),
        |args| async move { convert_weight(args) },
    )
}
