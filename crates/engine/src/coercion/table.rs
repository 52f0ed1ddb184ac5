//! Rendering of tabular option shapes into literal markup.

use std::fmt::{Debug, Write};

use serde_json::Value;
use toolform_types::display_string;

/// Turns a header row plus data rows into a literal markup string.
pub trait TableFormatter: Debug {
    fn format(&self, header: &[Value], rows: &[Vec<Value>]) -> String;
}

/// Sortable HTML table with escaped cells.
#[derive(Debug, Clone)]
pub struct HtmlTableFormatter {
    class: String,
}

impl Default for HtmlTableFormatter {
    fn default() -> Self {
        Self {
            class: "colored bordered sortable".to_string(),
        }
    }
}

impl HtmlTableFormatter {
    pub fn with_class(class: impl Into<String>) -> Self {
        Self { class: class.into() }
    }
}

impl TableFormatter for HtmlTableFormatter {
    fn format(&self, header: &[Value], rows: &[Vec<Value>]) -> String {
        let mut markup = String::new();
        let _ = write!(markup, "<table class=\"{}\">", escape_html(&self.class));
        if !header.is_empty() {
            markup.push_str("<thead><tr>");
            for cell in header {
                let _ = write!(markup, "<th>{}</th>", escape_html(&display_string(cell)));
            }
            markup.push_str("</tr></thead>");
        }
        markup.push_str("<tbody>");
        for row in rows {
            markup.push_str("<tr>");
            for cell in row {
                let _ = write!(markup, "<td>{}</td>", escape_html(&display_string(cell)));
            }
            markup.push_str("</tr>");
        }
        markup.push_str("</tbody></table>");
        markup
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_header_and_escaped_cells() {
        let markup = HtmlTableFormatter::default().format(
            &[json!("Name"), json!("Count")],
            &[vec![json!("<chr1>"), json!(3)], vec![json!("a&b"), json!(null)]],
        );
        assert_eq!(
            markup,
            "<table class=\"colored bordered sortable\"><thead><tr><th>Name</th><th>Count</th></tr></thead>\
             <tbody><tr><td>&lt;chr1&gt;</td><td>3</td></tr><tr><td>a&amp;b</td><td>null</td></tr></tbody></table>"
        );
    }

    #[test]
    fn empty_header_omits_thead() {
        let markup = HtmlTableFormatter::with_class("plain").format(&[], &[]);
        assert_eq!(markup, "<table class=\"plain\"><tbody></tbody></table>");
    }
}
