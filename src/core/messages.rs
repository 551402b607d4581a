use crate::domain::model::{FormMessages, NormalizedMessages};

pub const GENERIC_SUCCESS_MESSAGE: &str = "Success";

/// Keeps one message per element: the last one the form reported.
pub fn normalize_messages(messages: &FormMessages) -> NormalizedMessages {
    messages
        .iter()
        .map(|(element, by_rule)| {
            let kept = by_rule
                .values()
                .last()
                .map(|message| vec![message.clone()])
                .unwrap_or_default();
            (element.clone(), kept)
        })
        .collect()
}

/// Upper-cases the first letter of every whitespace separated word.
pub fn ucwords(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for c in value.chars() {
        if at_word_start && !c.is_whitespace() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

/// "<Name> was <verb>. <a href=\"url\">Click here to edit.</a>"
pub fn edit_link_message(display_name: &str, verb: &str, edit_url: &str) -> String {
    format!(
        "{} was {}. <a href=\"{}\">Click here to edit.</a>",
        display_name, verb, edit_url
    )
}

pub fn deleted_message(display_name: &str) -> String {
    format!("{} was deleted", display_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_keeps_last_message_per_element() {
        let mut messages = FormMessages::new();
        let mut email = IndexMap::new();
        email.insert("is_empty".to_string(), "Value is required".to_string());
        email.insert("email_invalid".to_string(), "Not an email".to_string());
        messages.insert("email".to_string(), email);
        messages.insert("name".to_string(), IndexMap::new());

        let normalized = normalize_messages(&messages);

        assert_eq!(normalized["email"], vec!["Not an email".to_string()]);
        assert!(normalized["name"].is_empty());
    }

    #[test]
    fn test_ucwords() {
        assert_eq!(ucwords("entity"), "Entity");
        assert_eq!(ucwords("billing address"), "Billing Address");
        assert_eq!(ucwords(""), "");
    }

    #[test]
    fn test_success_messages() {
        assert_eq!(
            edit_link_message("User", "updated", "/users/edit/1"),
            "User was updated. <a href=\"/users/edit/1\">Click here to edit.</a>"
        );
        assert_eq!(deleted_message("User"), "User was deleted");
    }
}
