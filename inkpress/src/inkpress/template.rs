//! Mustache-flavoured text rewriting.
//!
//! A render runs four passes over the template text, each on the output of the
//! previous one:
//!
//! 1. sections `{{#name}}…{{/name}}` (lists iterate, booleans show or hide),
//! 2. partials `{{>name}}`,
//! 3. raw substitutions `{{{name}}}`, re-rendered as templates,
//! 4. escaped substitutions `{{name}}`.
//!
//! Names that cannot be resolved leave their marker in the output untouched.
//! Templates are scanned fresh on every call; nothing is compiled or kept.

use log::warn;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::inkpress::escape::escape_html;
use crate::inkpress::view::{Value, View};

/// Nesting limit for partials, raw values and list items.
pub const DEFAULT_MAX_DEPTH: usize = 16;

static SECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{#\s*([-_/.\w]+)\s*\}\}\s?").expect("section regex")
});

static PARTIAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{>\s*([-_/.\w]+)\s*\}\}").expect("partial regex"));

static RAW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\{\s*([-_/.\w]+)\s*\}\}\}").expect("raw regex"));

static ESCAPED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([-_/.\w]+)\s*\}\}").expect("escaped regex"));

/// Source of partial templates. `None` keeps the `{{>name}}` marker as is.
pub trait Partials {
    fn resolve(&self, name: &str) -> Option<String>;
}

impl<F> Partials for F
where
    F: Fn(&str) -> Option<String>,
{
    fn resolve(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Resolver for templates that never include partials.
pub fn no_partials(_name: &str) -> Option<String> {
    None
}

#[derive(Clone, Copy, Debug)]
pub struct TemplateEngine {
    max_depth: usize,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl TemplateEngine {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn render(&self, template: &str, view: &View, partials: &dyn Partials) -> String {
        self.render_at(template, view, partials, 0)
    }

    fn render_at(&self, template: &str, view: &View, partials: &dyn Partials, depth: usize) -> String {
        if depth > self.max_depth {
            warn!(
                "template nesting exceeded {} levels, leaving text unrendered",
                self.max_depth
            );
            return template.to_string();
        }

        let text = self.render_sections(template, view, partials, depth);

        let text = PARTIAL_RE.replace_all(&text, |caps: &Captures| {
            match partials.resolve(&caps[1]) {
                Some(partial) => self.render_at(&partial, view, partials, depth + 1),
                None => caps[0].to_string(),
            }
        });

        let text = RAW_RE.replace_all(&text, |caps: &Captures| match view.text(&caps[1]) {
            Some(value) => self.render_at(&value, view, partials, depth + 1),
            None => caps[0].to_string(),
        });

        let text = ESCAPED_RE.replace_all(&text, |caps: &Captures| match view.text(&caps[1]) {
            Some(value) => escape_html(&value),
            None => caps[0].to_string(),
        });

        text.into_owned()
    }

    fn render_sections(
        &self,
        template: &str,
        view: &View,
        partials: &dyn Partials,
        depth: usize,
    ) -> String {
        let mut text = template.to_string();
        let mut index = 0;

        while index < text.len() {
            let Some(caps) = SECTION_RE.captures_at(&text, index) else {
                break;
            };
            let (Some(open), Some(name)) = (caps.get(0), caps.get(1)) else {
                break;
            };
            let start = open.start();
            let body_start = open.end();
            let name = name.as_str().to_string();
            index = body_start;

            let Some((body_end, section_end)) = find_section_close(&text, body_start, &name) else {
                continue;
            };
            let Some(value) = view.get(&name) else {
                continue;
            };

            let body = &text[body_start..body_end];
            let replacement = match value {
                Value::List(items) => items
                    .iter()
                    .map(|item| self.render_at(body, &view.merge(item), partials, depth + 1))
                    .collect(),
                Value::Bool(false) => String::new(),
                Value::Bool(true) | Value::Text(_) | Value::Lazy(_) => body.to_string(),
            };

            text.replace_range(start..section_end, &replacement);
            index = start;
        }

        text
    }
}

/// Start and end of the first `{{/name}}` at or after `from`.
fn find_section_close(text: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let pattern = format!(r"\{{\{{/\s*{}\s*\}}\}}\s?", regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    re.find_at(text, from).map(|m| (m.start(), m.end()))
}

/// Render with the default engine.
pub fn render(template: &str, view: &View, partials: &dyn Partials) -> String {
    TemplateEngine::default().render(template, view, partials)
}
