//! Body personalization using the `{{name}}` placeholder.

use crate::types::Recipient;

/// Marker in the body template replaced by the recipient's display name.
pub const NAME_PLACEHOLDER: &str = "{{name}}";

/// Name substituted when previewing a template with no recipients loaded.
pub const PREVIEW_NAME: &str = "Recipient Name";

/// Replace every occurrence of the placeholder with `name`. Nothing else in
/// the body is touched; an empty name renders as an empty string.
pub fn render_body(template: &str, name: &str) -> String {
    template.replace(NAME_PLACEHOLDER, name)
}

/// Render the body as it would go out to `recipient`.
pub fn personalize(template: &str, recipient: &Recipient) -> String {
    render_body(template, &recipient.name)
}

/// Render the body for the first recipient, falling back to a stand-in name.
pub fn preview(template: &str, first: Option<&Recipient>) -> String {
    render_body(template, first.map_or(PREVIEW_NAME, |r| r.name.as_str()))
}
