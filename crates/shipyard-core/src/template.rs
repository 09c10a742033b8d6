//! Shell command templates with `{placeholder}` substitution.

use std::collections::BTreeMap;
use std::path::Path;

use crate::remote::shell_quote;

/// Values available to a command template. Every value is shell-quoted on
/// substitution; unknown placeholders are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    vars: BTreeMap<&'static str, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.vars.insert(key, value.into());
        self
    }

    pub fn with_path(self, key: &'static str, path: &Path) -> Self {
        self.with(key, path.to_string_lossy().into_owned())
    }

    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let key = &after[..close];
                    match self.vars.get(key) {
                        Some(value) => out.push_str(&shell_quote(value)),
                        None => {
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_and_quotes() {
        let vars = TemplateVars::new()
            .with("env", "/srv/app/abc/env")
            .with("file", "/srv/app/abc/backup/db backup.sql");
        assert_eq!(
            vars.render("{env}/bin/python dump.py {file}"),
            "/srv/app/abc/env/bin/python dump.py '/srv/app/abc/backup/db backup.sql'"
        );
    }

    #[test]
    fn render_keeps_unknown_and_unclosed_braces() {
        let vars = TemplateVars::new().with("a", "1");
        assert_eq!(vars.render("{a} {b} awk '{print}'"), "1 {b} awk '{print}'");
        assert_eq!(vars.render("echo {a"), "echo {a");
    }
}
