//! Content rendering - placeholder substitution and the policy gate

mod placeholders;
mod policy;

pub use placeholders::{PlaceholderSet, Resolver};
pub use policy::{ContentPolicy, PolicyVerdict};

use mailcast_common::Recipient;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// A named message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub body: String,
}

impl Template {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }

    /// Templates in name order, so seeded selection is reproducible
    pub fn from_map(map: BTreeMap<String, String>) -> Vec<Template> {
        map.into_iter()
            .map(|(name, body)| Template { name, body })
            .collect()
    }
}

/// Personalized content for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedContent {
    pub html: String,
    pub plain_text: String,
    pub subject: String,
}

/// Rendering capability consumed by the dispatch engine
pub trait Renderer: Send + Sync {
    /// Render body and subject for a recipient; must be pure
    fn render(&self, template: &Template, subject: &str, recipient: &Recipient) -> RenderedContent;

    /// Render an attachment filename, restricted to `[A-Za-z0-9_.-]`
    fn render_filename(&self, name: &str, recipient: &Recipient) -> String;

    /// Run the keyword policy over rendered content
    fn check_policy(&self, content: &str) -> PolicyVerdict;
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[([A-Za-z0-9_]+)\]").unwrap())
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn whitespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Strip tags and collapse whitespace. Lossy; only used for the
/// plain-text alternative part.
pub fn html_to_plain_text(html: &str) -> String {
    let without_tags = tag_pattern().replace_all(html, "");
    whitespace_pattern()
        .replace_all(&without_tags, " ")
        .trim()
        .to_string()
}

/// Drop line breaks, then replace every char outside `[A-Za-z0-9_.-]`
/// with a single `_`
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Default renderer: closed placeholder set plus keyword policy
#[derive(Debug, Clone)]
pub struct ContentRenderer {
    placeholders: PlaceholderSet,
    policy: ContentPolicy,
    /// Fixed at construction so rendering is a pure function of its inputs
    date: String,
}

impl ContentRenderer {
    pub fn new(placeholders: PlaceholderSet, policy: ContentPolicy) -> Self {
        Self {
            placeholders,
            policy,
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
        }
    }

    /// Override the campaign date used by `[date]`
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    /// Replace known `[name]` tokens; unknown tokens are left as written
    pub fn substitute(&self, text: &str, recipient: &Recipient) -> String {
        placeholder_pattern()
            .replace_all(text, |caps: &Captures<'_>| match self.placeholders.get(&caps[1]) {
                Some(resolver) => resolver.resolve(recipient, &self.date),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

impl Renderer for ContentRenderer {
    fn render(&self, template: &Template, subject: &str, recipient: &Recipient) -> RenderedContent {
        let html = self.substitute(&template.body, recipient);
        let plain_text = html_to_plain_text(&html);
        RenderedContent {
            plain_text,
            html,
            subject: self.substitute(subject, recipient),
        }
    }

    fn render_filename(&self, name: &str, recipient: &Recipient) -> String {
        sanitize_filename(&self.substitute(name, recipient))
    }

    fn check_policy(&self, content: &str) -> PolicyVerdict {
        self.policy.check(content)
    }
}
