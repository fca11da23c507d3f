use minijinja::{Environment, UndefinedBehavior};

use crate::error::Sql2CsvError;

/// Substitute template variables into query text.
///
/// `vars` is a JSON object; its keys become template variables
/// (`{{ name }}`, `{% if ... %}`, ...). Referencing a variable that is not
/// defined is an error rather than an empty substitution.
pub fn render(query: &str, vars: &str) -> Result<String, Sql2CsvError> {
    let context: serde_json::Value =
        serde_json::from_str(vars).map_err(|e| Sql2CsvError::Template {
            message: format!("invalid --vars JSON: {}", e),
        })?;
    if !context.is_object() {
        return Err(Sql2CsvError::Template {
            message: "--vars must be a JSON object".to_string(),
        });
    }

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);

    let template = env
        .template_from_str(query)
        .map_err(|e| Sql2CsvError::Template {
            message: format!("cannot parse query template: {}", e),
        })?;

    template.render(&context).map_err(|e| Sql2CsvError::Template {
        message: format!("cannot render query template: {}", e),
    })
}
