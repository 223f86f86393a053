//! Extraction schema and prompt.

use serde_json::{Value, json};

/// JSON Schema the LLM fills in during extraction.
///
/// Only `invoice_number` is required here; a missing total is reported by
/// `store_invoice` so the agent can react to it.
pub fn invoice_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "invoice_number": {
                "type": "string",
                "description": "Invoice identifier exactly as printed, e.g. INV-2024-001"
            },
            "date": {
                "type": "string",
                "description": "Invoice date, YYYY-MM-DD when possible"
            },
            "vendor": {
                "type": "object",
                "description": "Who issued the invoice",
                "properties": {
                    "name": {"type": "string"},
                    "address": {"type": "string"}
                }
            },
            "line_items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "description": {"type": "string"},
                        "quantity": {"type": "number"},
                        "unit_price": {"type": "number"},
                        "amount": {"type": "number", "description": "Line total"}
                    }
                }
            },
            "subtotal": {"type": "number"},
            "tax": {"type": "number"},
            "total": {"type": "number", "description": "Amount due including tax"}
        },
        "required": ["invoice_number"]
    })
}

/// Prompt wrapping the document text for extraction
pub fn extraction_prompt(document_text: &str) -> String {
    format!(
        "Extract the structured data from the invoice below.\n\n\
         Capture the invoice number, date, vendor name and address, every line item \
         (description, quantity, unit price, amount), subtotal, tax and total. \
         Amounts must be plain numbers without currency symbols. \
         Leave out fields that do not appear in the document.\n\n\
         <invoice>\n{}\n</invoice>",
        document_text.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_structure() {
        let schema = invoice_schema();
        let props = &schema["properties"];
        for field in ["invoice_number", "date", "vendor", "line_items", "subtotal", "tax", "total"] {
            assert!(props.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(props["total"]["type"], "number");
        assert_eq!(props["line_items"]["items"]["properties"]["unit_price"]["type"], "number");
        assert_eq!(schema["required"], json!(["invoice_number"]));
        assert!(jsonschema::is_valid(&schema, &json!({"invoice_number": "INV-001"})));
    }

    #[test]
    fn test_prompt_wraps_document() {
        let prompt = extraction_prompt("Invoice #INV-001\nTotal: $1500\n");
        assert!(prompt.contains("<invoice>\nInvoice #INV-001\nTotal: $1500\n</invoice>"));
    }
}
