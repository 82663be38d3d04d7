use std::collections::HashMap;

use crate::template::{CardRecord, CardTemplate};

/// Barcode payload with the fallback applied. Both the variable table and
/// the barcode provider resolve through here so they can never disagree.
pub(crate) fn barcode_payload(card: &CardRecord) -> &str {
    if card.barcode_data.is_empty() {
        &card.id_number
    } else {
        &card.barcode_data
    }
}

/// The fixed per-card substitution table.
pub fn build_variables(template: &CardTemplate, card: &CardRecord) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("person_name".to_string(), card.person_name.clone());
    vars.insert("person_title".to_string(), card.person_title.clone());
    vars.insert("department".to_string(), card.department.clone());
    vars.insert("employee_id".to_string(), card.employee_id.clone());
    vars.insert("id_number".to_string(), card.id_number.clone());
    vars.insert("card_number".to_string(), card.card_number.clone());
    vars.insert("company_name".to_string(), template.company.name.clone());
    vars.insert("barcode_data".to_string(), barcode_payload(card).to_string());
    vars.insert(
        "expiration_date".to_string(),
        card.expiration_date.clone().unwrap_or_else(|| "N/A".to_string()),
    );
    vars.insert(
        "issue_date".to_string(),
        card.issue_date.clone().unwrap_or_default(),
    );
    vars
}

/// Replaces `{token}` occurrences from the table. Unknown tokens and
/// unclosed braces are kept verbatim.
pub fn substitute(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest: &str = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        rest = &rest[start + 1..];

        let Some(end) = rest.find('}') else {
            out.push('{');
            out.push_str(rest);
            return out;
        };

        let token = &rest[..end];
        if let Some(value) = vars.get(token) {
            out.push_str(value);
        } else {
            out.push('{');
            out.push_str(token);
            out.push('}');
        }

        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (CardTemplate, CardRecord) {
        let mut template = CardTemplate::cr80("Employee badge");
        template.company.name = "ACME Corp".to_string();
        let mut card = CardRecord::new("emp-001");
        card.person_name = "JUAN PÉREZ".to_string();
        card.employee_id = "EMP-001".to_string();
        card.id_number = "12345678".to_string();
        (template, card)
    }

    #[test]
    fn substitutes_known_tokens() {
        let (template, card) = sample();
        let vars = build_variables(&template, &card);
        assert_eq!(
            substitute("{person_name} / {company_name}", &vars),
            "JUAN PÉREZ / ACME Corp"
        );
    }

    #[test]
    fn unknown_tokens_stay_verbatim() {
        let (template, card) = sample();
        let vars = build_variables(&template, &card);
        assert_eq!(substitute("ID: {unknown_field}", &vars), "ID: {unknown_field}");
        assert_eq!(substitute("open {person_name", &vars), "open {person_name");
    }

    #[test]
    fn barcode_data_falls_back_to_id_number() {
        let (template, mut card) = sample();
        assert_eq!(barcode_payload(&card), "12345678");
        card.barcode_data = "CUSTOM-99".to_string();
        assert_eq!(barcode_payload(&card), "CUSTOM-99");
        let vars = build_variables(&template, &card);
        assert_eq!(vars["barcode_data"], "CUSTOM-99");
    }

    #[test]
    fn missing_dates_have_placeholders() {
        let (template, mut card) = sample();
        let vars = build_variables(&template, &card);
        assert_eq!(vars["expiration_date"], "N/A");
        assert_eq!(vars["issue_date"], "");
        card.expiration_date = Some("2026-12-31".to_string());
        let vars = build_variables(&template, &card);
        assert_eq!(vars["expiration_date"], "2026-12-31");
    }
}
