//! src/fs/collator.rs
//! ============================================================
//! Locale-aware name ordering for listings.
//!
//! Only the locale is stored; the ICU collator itself is built where the
//! comparison runs (inside the blocking listing task), so the lister stays
//! `Send` regardless of the collator's internals.

use std::cmp::Ordering;

use icu_collator::{Collator, CollatorOptions};
use icu_locid::Locale;
use tracing::warn;

pub const DEFAULT_COLLATION_LOCALE: &str = "zh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollator {
    locale: Locale,
}

impl Default for NameCollator {
    fn default() -> Self {
        Self::new(DEFAULT_COLLATION_LOCALE)
    }
}

impl NameCollator {
    /// Any BCP-47 tag; unparseable tags fall back to the root locale.
    #[must_use]
    pub fn new(tag: &str) -> Self {
        let locale: Locale = match tag.parse::<Locale>() {
            Ok(locale) => locale,

            Err(e) => {
                warn!(
                    marker = "COLLATOR_FALLBACK",
                    tag = %tag,
                    error = %e,
                    "Unparseable collation locale, using root collation"
                );
                Locale::UND
            }
        };

        Self { locale }
    }

    #[must_use]
    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    /// Build a comparator for one sorting pass.
    #[must_use]
    pub fn comparator(&self) -> NameComparator {
        let collator: Option<Collator> =
            match Collator::try_new(&(&self.locale).into(), CollatorOptions::new()) {
                Ok(collator) => Some(collator),

                Err(e) => {
                    warn!(
                        marker = "COLLATOR_FALLBACK",
                        locale = %self.locale,
                        error = %e,
                        "No collation data for locale, comparing code points"
                    );
                    None
                }
            };

        NameComparator { collator }
    }

    /// Stable in-place sort of `items` by the collated key.
    pub fn sort_by_key<T, F>(&self, items: &mut [T], key: F)
    where
        F: Fn(&T) -> &str,
    {
        let comparator: NameComparator = self.comparator();
        items.sort_by(|a: &T, b: &T| comparator.compare(key(a), key(b)));
    }
}

pub struct NameComparator {
    collator: Option<Collator>,
}

impl NameComparator {
    #[must_use]
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match &self.collator {
            Some(collator) => collator.compare(a, b),
            None => a.cmp(b),
        }
    }
}
