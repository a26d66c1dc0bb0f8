//! Prompt templates for structured extraction.

/// Builds the receipt prompt. The model is asked for a single JSON object.
pub fn receipt_prompt(text: &str, max_chars: usize) -> String {
    format!(
        r#"Extract the purchase details from this receipt text.

Return ONLY a JSON object with exactly these fields:
{{
  "amount": <total paid as a number, or null if not found>,
  "merchant": <store or business name, or null>,
  "date": <purchase date as YYYY-MM-DD, or null>,
  "category": <one short spending category, e.g. "Food & Dining", "Transportation", "Shopping", or "Other">,
  "items": [{{"name": <string>, "quantity": <number>, "price": <number>}}],
  "confidence": <number between 0 and 1 for how certain you are about amount and merchant>
}}

Receipt text:
{}"#,
        truncate_chars(text, max_chars)
    )
}

/// Builds the statement prompt. The model is asked for a JSON array.
pub fn statement_prompt(text: &str, max_chars: usize) -> String {
    format!(
        r#"Extract every transaction from this bank statement text.

Return ONLY a JSON array. Each element must have:
{{
  "date": <transaction date as YYYY-MM-DD>,
  "description": <payee or description>,
  "amount": <positive number>,
  "type": "income" or "expense",
  "category": <one short spending category, or null>
}}

Skip opening/closing balances and totals. Return [] if there are no transactions.

Statement text:
{}"#,
        truncate_chars(text, max_chars)
    )
}

/// Truncates on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
