//! Domain Models
//!
//! Invoice records as extracted by the LLM and kept in the store.
//! Uses `rust_decimal` for all monetary values; amounts are serialized as
//! JSON numbers.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{InvoiceError, Result};

/// Vendor information extracted from an invoice
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// A single invoice line
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub quantity: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub unit_price: Option<Decimal>,

    /// Line total
    #[serde(default, skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
}

/// A validated invoice, keyed by `invoice_number`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_number: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<Vendor>,

    #[serde(default)]
    pub line_items: Vec<LineItem>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub subtotal: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub tax: Option<Decimal>,

    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,

    /// Fields the model extracted beyond the known ones
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

const INVOICE_AMOUNTS: [&str; 2] = ["subtotal", "tax"];
const LINE_AMOUNTS: [&str; 3] = ["quantity", "unit_price", "amount"];

impl Invoice {
    pub fn new(invoice_number: impl Into<String>, total: Decimal) -> Self {
        Self {
            invoice_number: invoice_number.into(),
            date: None,
            vendor: None,
            line_items: Vec::new(),
            subtotal: None,
            tax: None,
            total,
            extra: BTreeMap::new(),
        }
    }

    /// Validate and normalize a raw extracted record.
    ///
    /// The invoice number must be a non-empty string (numbers are accepted)
    /// and the total must be present and numeric. Money strings such as
    /// `"$1,500.00"` are parsed; `total_amount` is accepted for `total`.
    pub fn from_record(record: &Value) -> Result<Self> {
        let fields = record.as_object().ok_or(InvoiceError::NotAnObject)?;
        let mut normalized = fields.clone();

        let invoice_number = match fields.get("invoice_number") {
            Some(Value::String(n)) if !n.trim().is_empty() => n.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(InvoiceError::MissingInvoiceNumber),
        };
        normalized.insert("invoice_number".into(), Value::String(invoice_number.clone()));

        if !normalized.contains_key("total") {
            if let Some(total) = normalized.remove("total_amount") {
                normalized.insert("total".into(), total);
            }
        }
        if matches!(normalized.get("total"), None | Some(Value::Null)) {
            return Err(InvoiceError::MissingTotal(invoice_number));
        }
        normalize_amount(&mut normalized, "total", "total")?;

        for field in INVOICE_AMOUNTS {
            normalize_amount(&mut normalized, field, field)?;
        }

        match normalized.get_mut("line_items") {
            None => {}
            Some(items) if items.is_null() => *items = Value::Array(Vec::new()),
            Some(Value::Array(lines)) => {
                for (idx, line) in lines.iter_mut().enumerate() {
                    let Some(line) = line.as_object_mut() else {
                        return Err(InvoiceError::Malformed(format!("line item {} is not an object", idx)));
                    };
                    if !line.contains_key("amount") {
                        if let Some(total) = line.remove("total") {
                            line.insert("amount".into(), total);
                        }
                    }
                    for field in LINE_AMOUNTS {
                        normalize_amount(line, field, &format!("line_items[{}].{}", idx, field))?;
                    }
                }
            }
            Some(_) => return Err(InvoiceError::Malformed("line_items must be a list".into())),
        }

        if normalized.get("vendor").is_some_and(Value::is_null) {
            normalized.remove("vendor");
        }
        if normalized.get("date").is_some_and(Value::is_null) {
            normalized.remove("date");
        }

        serde_json::from_value(Value::Object(normalized)).map_err(|e| InvoiceError::Malformed(e.to_string()))
    }

    /// JSON record as stored and returned by the API
    pub fn to_record(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Parse a JSON number or money string into a `Decimal`
pub fn parse_money(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' '))
                .collect();
            Decimal::from_str(&cleaned).ok()
        }
        _ => None,
    }
}

/// Replace a money field with its canonical string form, dropping nulls
fn normalize_amount(fields: &mut Map<String, Value>, key: &str, label: &str) -> Result<()> {
    let Some(raw) = fields.get(key) else {
        return Ok(());
    };
    if raw.is_null() {
        fields.remove(key);
        return Ok(());
    }

    let amount = parse_money(raw).ok_or_else(|| InvoiceError::InvalidAmount {
        field: label.to_string(),
        value: raw.to_string(),
    })?;
    fields.insert(key.to_string(), Value::String(amount.to_string()));
    Ok(())
}
