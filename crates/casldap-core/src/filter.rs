//! Search filter templates

use crate::error::{CasLdapError, Result};
use crate::settings::USER_PLACEHOLDER;

/// Token substituted when checking that a template renders to a valid filter
const SAMPLE_TOKEN: &str = "jdoe";

/// Substitute an identity token into a filter template, escaping it so the
/// token cannot alter the structure of the filter.
pub fn render_filter(template: &str, token: &str) -> String {
    template.replace(USER_PLACEHOLDER, &ldap3::ldap_escape(token))
}

/// A filter template must contain the identity placeholder, be enclosed in
/// parentheses and render to a filter the LDAP filter parser accepts.
pub fn validate_filter_template(template: &str) -> Result<()> {
    let trimmed = template.trim();
    if !trimmed.contains(USER_PLACEHOLDER) {
        return Err(CasLdapError::config_error(format!(
            "search_filter must contain the {} placeholder",
            USER_PLACEHOLDER
        )));
    }
    if !(trimmed.starts_with('(') && trimmed.ends_with(')')) {
        return Err(CasLdapError::config_error(
            "search_filter must be enclosed in parentheses",
        ));
    }

    let rendered = render_filter(trimmed, SAMPLE_TOKEN);
    ldap3::parse_filter(&rendered).map_err(|_| {
        CasLdapError::config_error(format!(
            "search_filter `{}` is not a valid LDAP filter (rendered as `{}`)",
            template, rendered
        ))
    })?;
    Ok(())
}
