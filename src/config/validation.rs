//! Template validation helpers.

use minijinja::{Environment, UndefinedBehavior};

/// Check minijinja syntax without rendering.
pub(crate) fn validate_jinja_template(source: &str) -> Result<(), String> {
    let mut env = Environment::new();
    env.add_template("_validate", source)
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Render a template against empty data to catch runtime errors such as
/// unknown filters. Missing variables are allowed.
///
/// # Errors
/// Returns the minijinja error message.
pub fn validate_template_render(source: &str) -> Result<(), String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Lenient);
    env.add_template("_render_test", source)
        .map_err(|e| e.to_string())?;

    env.get_template("_render_test")
        .and_then(|tmpl| tmpl.render(serde_json::json!({})))
        .map(|_| ())
        .map_err(|e| e.to_string())
}
