//! Minimal `{{variable}}` substitution against the execution context, used
//! when rendering processor config strings (email bodies, webhook payloads,
//! approval messages). Unknown variables render as empty strings.

use crate::DataMap;
use serde_json::Value;

pub fn render(template: &str, context: &DataMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let key = after[..close].trim();
                if let Some(value) = context.get(key) {
                    out.push_str(&stringify(value));
                }
                rest = &after[close + 2..];
            }
            None => {
                // Unterminated placeholder: emit verbatim.
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> DataMap {
        let mut ctx = DataMap::new();
        ctx.insert("client".to_string(), json!("Acme LLP"));
        ctx.insert("amount".to_string(), json!(1500));
        ctx
    }

    #[test]
    fn substitutes_known_variables() {
        let rendered = render("Invoice for {{client}}: ${{amount}}", &context());
        assert_eq!(rendered, "Invoice for Acme LLP: $1500");
    }

    #[test]
    fn unknown_variables_render_empty() {
        assert_eq!(render("Hi {{missing}}!", &context()), "Hi !");
    }

    #[test]
    fn whitespace_in_placeholders_is_trimmed() {
        assert_eq!(render("{{ client }}", &context()), "Acme LLP");
    }

    #[test]
    fn unterminated_placeholder_passes_through() {
        assert_eq!(render("broken {{client", &context()), "broken {{client");
    }
}
