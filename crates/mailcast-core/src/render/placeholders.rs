//! Placeholder resolvers
//!
//! Placeholders are resolved by a closed set of named functions over the
//! recipient. Paths from placeholder files are matched against that set;
//! nothing is ever evaluated.

use mailcast_common::{Recipient, RecipientField};
use mailcast_storage::PlaceholderDef;
use std::collections::HashMap;
use tracing::warn;

/// A named way of producing a placeholder value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolver {
    /// A recipient field, or the fallback when the field is empty
    Field {
        field: RecipientField,
        fallback: Option<String>,
    },
    /// The part of the email after `@`
    DomainOfEmail { fallback: Option<String> },
    /// The part of the email before `@`
    LocalPartOfEmail { fallback: Option<String> },
    /// The campaign date
    Date,
    /// Fixed text
    Literal(String),
    /// A path outside the supported set; yields only the fallback
    Unresolvable { fallback: Option<String> },
}

impl Resolver {
    pub fn field(field: RecipientField, fallback: Option<&str>) -> Self {
        Resolver::Field {
            field,
            fallback: fallback.map(str::to_string),
        }
    }

    /// Map a placeholder-file definition onto a resolver
    pub fn from_def(def: &PlaceholderDef) -> Self {
        let fallback = def.fallback.clone();
        let path = def.path.trim();

        if let Some(field) = RecipientField::parse(path) {
            return Resolver::Field { field, fallback };
        }

        match path {
            "email.split('@')[1]" | "email.split(\"@\")[1]" | "domain" => {
                Resolver::DomainOfEmail { fallback }
            }
            "email.split('@')[0]" | "email.split(\"@\")[0]" | "localPart" => {
                Resolver::LocalPartOfEmail { fallback }
            }
            "date" => Resolver::Date,
            quoted if is_quoted(quoted) => Resolver::Literal(quoted[1..quoted.len() - 1].to_string()),
            other => {
                warn!(
                    placeholder = %def.name,
                    "Unsupported placeholder path '{}', only its fallback will be used",
                    other
                );
                Resolver::Unresolvable { fallback }
            }
        }
    }

    /// Produce the value for a recipient; never fails
    pub fn resolve(&self, recipient: &Recipient, date: &str) -> String {
        let (value, fallback) = match self {
            Resolver::Field { field, fallback } => (Some(recipient.field(*field)), fallback),
            Resolver::DomainOfEmail { fallback } => (
                recipient.email.split_once('@').map(|(_, domain)| domain),
                fallback,
            ),
            Resolver::LocalPartOfEmail { fallback } => (
                recipient.email.split_once('@').map(|(local, _)| local),
                fallback,
            ),
            Resolver::Date => return date.to_string(),
            Resolver::Literal(text) => return text.clone(),
            Resolver::Unresolvable { fallback } => (None, fallback),
        };

        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| fallback.clone())
            .unwrap_or_default()
    }
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
}

/// The placeholders known to a campaign, by name
#[derive(Debug, Clone)]
pub struct PlaceholderSet {
    resolvers: HashMap<String, Resolver>,
}

impl PlaceholderSet {
    /// An empty set
    pub fn empty() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// The set used when no placeholder file is provided
    pub fn builtin() -> Self {
        let mut set = Self::empty();
        set.insert(
            "firstName",
            Resolver::field(RecipientField::FirstName, Some("Valued Customer")),
        );
        set.insert("lastName", Resolver::field(RecipientField::LastName, None));
        set.insert("email", Resolver::field(RecipientField::Email, None));
        set.insert(
            "company",
            Resolver::field(RecipientField::Company, Some("Your Company")),
        );
        set.insert("domain", Resolver::DomainOfEmail { fallback: None });
        set.insert("date", Resolver::Date);
        set
    }

    /// Build from file definitions; falls back to the built-in set when
    /// there are none. `date` is always available.
    pub fn from_defs(defs: &[PlaceholderDef]) -> Self {
        if defs.is_empty() {
            return Self::builtin();
        }

        let mut set = Self::empty();
        for def in defs {
            set.insert(def.name.clone(), Resolver::from_def(def));
        }
        set.resolvers
            .entry("date".to_string())
            .or_insert(Resolver::Date);
        set
    }

    pub fn insert(&mut self, name: impl Into<String>, resolver: Resolver) {
        self.resolvers.insert(name.into(), resolver);
    }

    pub fn get(&self, name: &str) -> Option<&Resolver> {
        self.resolvers.get(name)
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl Default for PlaceholderSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn def(name: &str, path: &str, fallback: Option<&str>) -> PlaceholderDef {
        PlaceholderDef {
            name: name.to_string(),
            path: path.to_string(),
            fallback: fallback.map(str::to_string),
        }
    }

    #[test]
    fn test_domain_expression_maps_to_named_resolver() {
        let resolver = Resolver::from_def(&def("domain", "email.split('@')[1]", Some("example.com")));
        assert_eq!(
            resolver,
            Resolver::DomainOfEmail {
                fallback: Some("example.com".to_string())
            }
        );

        let recipient = Recipient::new("ada@engines.io");
        assert_eq!(resolver.resolve(&recipient, "2024-01-01"), "engines.io");

        let broken = Recipient::new("no-at-sign");
        assert_eq!(resolver.resolve(&broken, "2024-01-01"), "example.com");
    }

    #[test]
    fn test_field_fallback_and_empty() {
        let recipient = Recipient::new("a@x.com");
        let with_fallback = Resolver::field(RecipientField::FirstName, Some("Friend"));
        let without = Resolver::field(RecipientField::LastName, None);

        assert_eq!(with_fallback.resolve(&recipient, ""), "Friend");
        assert_eq!(without.resolve(&recipient, ""), "");
    }

    #[test]
    fn test_unsupported_path_never_evaluates() {
        let resolver = Resolver::from_def(&def("x", "constructor.constructor('boom')()", None));
        assert_eq!(resolver, Resolver::Unresolvable { fallback: None });
        assert_eq!(resolver.resolve(&Recipient::new("a@x.com"), ""), "");

        let resolver = Resolver::from_def(&def("y", "address.city", Some("Nowhere")));
        assert_eq!(resolver.resolve(&Recipient::new("a@x.com"), ""), "Nowhere");
    }

    #[test]
    fn test_literal_and_date() {
        let literal = Resolver::from_def(&def("brand", "'Mailcast'", None));
        assert_eq!(literal.resolve(&Recipient::new("a@x.com"), ""), "Mailcast");
        assert_eq!(
            Resolver::Date.resolve(&Recipient::new("a@x.com"), "2024-05-06"),
            "2024-05-06"
        );
    }

    #[test]
    fn test_from_defs_keeps_date() {
        let set = PlaceholderSet::from_defs(&[def("first", "firstName", None)]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("date"), Some(&Resolver::Date));
        assert!(set.get("lastName").is_none());

        let builtin = PlaceholderSet::from_defs(&[]);
        assert!(builtin.get("firstName").is_some());
        assert!(builtin.get("company").is_some());
    }
}
