//! HTML views compiled into the binary
//!
//! Templates use `{{name}}` placeholders; every substituted value is
//! HTML-escaped.

const INDEX: &str = include_str!("../../templates/index.html");
const RESULT: &str = include_str!("../../templates/result.html");
const MANUAL_EDITOR: &str = include_str!("../../templates/manual_editor.html");
const RESULT_MANUAL: &str = include_str!("../../templates/result_manual.html");

/// Escape text for use inside element content and quoted attributes
#[must_use]
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn render(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |page, (name, value)| {
        page.replace(&format!("{{{{{name}}}}}"), &escape_html(value))
    })
}

#[must_use]
pub fn index() -> String {
    INDEX.to_string()
}

/// Result page; both paths are relative to the static root
#[must_use]
pub fn result(input_image: &str, output_image: &str) -> String {
    render(RESULT, &[("input_image", input_image), ("output_image", output_image)])
}

/// Manual editor, optionally preloaded with an image URL
#[must_use]
pub fn manual_editor(image_path: Option<&str>) -> String {
    render(MANUAL_EDITOR, &[("image_path", image_path.unwrap_or_default())])
}

#[must_use]
pub fn result_manual(output_image: &str) -> String {
    render(RESULT_MANUAL, &[("output_image", output_image)])
}
