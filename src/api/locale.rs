//! Marketplace locales
//!
//! A fixed table of the Kindle marketplaces. Each entry carries the
//! country code, the store domain suffix and the language tag sent as
//! `Accept-Language`. The table is built once and shared read-only.
//!
//! Lookups scan in table order and return the first match; the table is
//! not checked for duplicate keys.

use crate::error::{KindleError, Result};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// A single marketplace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    /// Table key, e.g. `united_states`
    pub name: String,

    /// Two-letter country code (`us`, `de`, ...)
    pub country_code: String,

    /// Store domain suffix (`com`, `co.uk`, ...)
    pub domain: String,

    /// Language tag for `Accept-Language`; empty for marketplaces that
    /// do not advertise one
    pub language: String,
}

struct LocaleTemplate {
    name: &'static str,
    country_code: &'static str,
    domain: &'static str,
    language: &'static str,
}

const TEMPLATES: &[LocaleTemplate] = &[
    LocaleTemplate { name: "germany", country_code: "de", domain: "de", language: "de-DE" },
    LocaleTemplate { name: "united_states", country_code: "us", domain: "com", language: "en-US" },
    LocaleTemplate { name: "united_kingdom", country_code: "uk", domain: "co.uk", language: "en-GB" },
    LocaleTemplate { name: "france", country_code: "fr", domain: "fr", language: "fr-fr" },
    LocaleTemplate { name: "canada", country_code: "ca", domain: "ca", language: "en-CA" },
    LocaleTemplate { name: "italy", country_code: "it", domain: "it", language: "it" },
    LocaleTemplate { name: "australia", country_code: "au", domain: "com.au", language: "en-AU" },
    LocaleTemplate { name: "india", country_code: "in", domain: "in", language: "" },
    LocaleTemplate { name: "japan", country_code: "jp", domain: "co.jp", language: "ja" },
    LocaleTemplate { name: "spain", country_code: "es", domain: "es", language: "es-ES" },
];

lazy_static! {
    static ref LOCALES: Vec<Locale> = TEMPLATES
        .iter()
        .map(|t| Locale {
            name: t.name.to_string(),
            country_code: t.country_code.to_string(),
            domain: t.domain.to_string(),
            language: t.language.to_string(),
        })
        .collect();
}

impl Locale {
    /// All known marketplaces in table order
    pub fn all() -> &'static [Locale] {
        &LOCALES
    }

    /// Look up a marketplace by country code (case-insensitive)
    pub fn from_country_code(country_code: &str) -> Result<Locale> {
        Self::search("country_code", country_code, |l| &l.country_code)
    }

    /// Look up a marketplace by store domain (case-insensitive)
    pub fn from_domain(domain: &str) -> Result<Locale> {
        Self::search("domain", domain, |l| &l.domain)
    }

    fn search(
        key: &'static str,
        value: &str,
        field: impl Fn(&Locale) -> &String,
    ) -> Result<Locale> {
        LOCALES
            .iter()
            .find(|l| field(l).eq_ignore_ascii_case(value))
            .cloned()
            .ok_or_else(|| {
                tracing::debug!(key, value, "no marketplace matches");
                KindleError::UnsupportedLocale {
                    key,
                    value: value.to_string(),
                }
            })
    }

    pub fn us() -> Locale {
        Self::named("united_states")
    }

    pub fn uk() -> Locale {
        Self::named("united_kingdom")
    }

    pub fn de() -> Locale {
        Self::named("germany")
    }

    pub fn jp() -> Locale {
        Self::named("japan")
    }

    // Only called with names present in TEMPLATES.
    fn named(name: &str) -> Locale {
        LOCALES
            .iter()
            .find(|l| l.name == name)
            .cloned()
            .unwrap_or_else(|| LOCALES[0].clone())
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::us()
    }
}
