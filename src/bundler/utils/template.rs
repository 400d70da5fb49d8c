//! Handlebars rendering for URL templates and generated text files.

use crate::bundler::error::Result;
use handlebars::Handlebars;
use serde::Serialize;

/// Renders `template` with `data`.
///
/// Rendering is strict (an unknown placeholder is an error) and does not HTML-escape
/// values, so URLs and source files come out verbatim.
pub fn render<T: Serialize>(template: &str, data: &T) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(handlebars::no_escape);
    Ok(handlebars.render_template(template, data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_without_escaping() {
        let out = render(
            "https://example.com/get?v={{ version }}&x=1",
            &json!({ "version": "2.5.5" }),
        )
        .unwrap();
        assert_eq!(out, "https://example.com/get?v=2.5.5&x=1");
    }

    #[test]
    fn unknown_placeholder_fails() {
        assert!(render("{{ nope }}", &json!({ "version": "1" })).is_err());
    }
}
