//! Placeholder rendering for playbook strings
//!
//! `{{user_id}}`, `{{task_id}}`, `{{protocol}}` and `{{role}}` are replaced
//! first, optionally sliced by character range (`{{task_id[0..8]}}`,
//! `{{user_id[..4]}}`). `$VAR` is then replaced from the process environment;
//! unknown variables are left as written.

use crate::context::ExecutionContext;
use crate::error::{PlaybookError, Result};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(\w+)(?:\[(\d*)\.\.(\d*)\])?\s*\}\}").expect("placeholder pattern")
});

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\w+)").expect("environment variable pattern"));

/// Values available to `{{...}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    pub user_id: String,
    pub task_id: String,
    pub protocol: String,
    pub role: String,
}

impl TemplateVars {
    pub fn from_context(ctx: &ExecutionContext) -> Self {
        Self {
            user_id: ctx.user_id.to_string(),
            task_id: ctx.task_id.to_string(),
            protocol: ctx.protocol_name.clone(),
            role: ctx.role.clone(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "user_id" => Some(&self.user_id),
            "task_id" => Some(&self.task_id),
            "protocol" => Some(&self.protocol),
            "role" => Some(&self.role),
            _ => None,
        }
    }

    /// Replace placeholders, then environment variables.
    pub fn render(&self, text: &str) -> Result<String> {
        let placeholders = self.render_placeholders(text)?;
        Ok(expand_env(&placeholders))
    }

    fn render_placeholders(&self, text: &str) -> Result<String> {
        let mut error = None;
        let rendered = PLACEHOLDER.replace_all(text, |caps: &Captures<'_>| {
            match self.substitute(caps) {
                Ok(value) => value,
                Err(e) => {
                    error.get_or_insert(e);
                    String::new()
                }
            }
        });
        match error {
            Some(e) => Err(e),
            None => Ok(rendered.into_owned()),
        }
    }

    fn substitute(&self, caps: &Captures<'_>) -> Result<String> {
        let name = &caps[1];
        let value = self
            .lookup(name)
            .ok_or_else(|| PlaybookError::Template(format!("unknown placeholder {{{{{name}}}}}")))?;

        // No `[..]` suffix: whole value.
        if caps.get(2).is_none() && caps.get(3).is_none() {
            return Ok(value.to_string());
        }

        let chars: Vec<char> = value.chars().collect();
        let low = bound(caps.get(2).map(|m| m.as_str()), 0)?;
        let high = bound(caps.get(3).map(|m| m.as_str()), chars.len())?;
        if low > high || high > chars.len() {
            return Err(PlaybookError::Template(format!(
                "slice [{low}..{high}] out of range for {name} ({} characters)",
                chars.len()
            )));
        }
        Ok(chars[low..high].iter().collect())
    }
}

fn bound(text: Option<&str>, default: usize) -> Result<usize> {
    match text {
        None | Some("") => Ok(default),
        Some(digits) => digits
            .parse()
            .map_err(|_| PlaybookError::Template(format!("invalid slice bound {digits:?}"))),
    }
}

/// Replace `$VAR` with the environment value; unknown names stay literal.
pub fn expand_env(text: &str) -> String {
    ENV_VAR
        .replace_all(text, |caps: &Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TemplateVars {
        TemplateVars {
            user_id: "alice".into(),
            task_id: "0f8fad5b-d9cb-469f-a165-70867728950e".into(),
            protocol: "transfer".into(),
            role: "sender".into(),
        }
    }

    #[test]
    fn test_plain_placeholders() {
        assert_eq!(
            vars().render("out/{{protocol}}/{{role}}/{{ user_id }}.txt").unwrap(),
            "out/transfer/sender/alice.txt"
        );
    }

    #[test]
    fn test_slices() {
        let vars = vars();
        assert_eq!(vars.render("{{task_id[0..8]}}").unwrap(), "0f8fad5b");
        assert_eq!(vars.render("{{user_id[..2]}}").unwrap(), "al");
        assert_eq!(vars.render("{{user_id[3..]}}").unwrap(), "ce");
        assert_eq!(vars.render("{{user_id[..]}}").unwrap(), "alice");
        assert!(vars.render("{{user_id[2..9]}}").is_err());
        assert!(vars.render("{{user_id[4..2]}}").is_err());
    }

    #[test]
    fn test_unknown_placeholder_is_an_error() {
        assert!(matches!(
            vars().render("{{password}}"),
            Err(PlaybookError::Template(_))
        ));
    }

    #[test]
    fn test_environment_expansion() {
        std::env::set_var("TANDEM_TEMPLATE_TEST_DIR", "/srv/data");
        assert_eq!(
            vars().render("$TANDEM_TEMPLATE_TEST_DIR/{{role}}").unwrap(),
            "/srv/data/sender"
        );
        assert_eq!(
            expand_env("$TANDEM_TEMPLATE_TEST_SURELY_UNSET/x"),
            "$TANDEM_TEMPLATE_TEST_SURELY_UNSET/x"
        );
    }
}
