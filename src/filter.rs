//! Predicates deciding which manifest sets enter a run.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::configuration::BulkProcessingConfiguration;
use crate::types::CatalogSet;

pub trait SetFilter: Send + Sync {
    fn name(&self) -> &'static str;
    fn includes(&self, set: &CatalogSet) -> bool;
}

/// Drops sets that only exist in digital clients.
#[derive(Debug, Default)]
pub struct DigitalExclusion;

impl SetFilter for DigitalExclusion {
    fn name(&self) -> &'static str {
        "digital"
    }

    fn includes(&self, set: &CatalogSet) -> bool {
        !set.digital
    }
}

/// Keeps only listed set codes. An empty list restricts nothing.
#[derive(Debug, Default)]
pub struct CodeAllowList {
    codes: HashSet<String>,
}

impl CodeAllowList {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(|c| c.as_ref().trim().to_ascii_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }
}

impl SetFilter for CodeAllowList {
    fn name(&self) -> &'static str {
        "allow-list"
    }

    fn includes(&self, set: &CatalogSet) -> bool {
        self.codes.is_empty() || self.codes.contains(&set.code.to_ascii_lowercase())
    }
}

/// Drops sets released before the cutoff. Undated sets pass.
#[derive(Debug)]
pub struct ReleaseCutoff {
    cutoff: NaiveDate,
}

impl ReleaseCutoff {
    pub fn new(cutoff: NaiveDate) -> Self {
        Self { cutoff }
    }
}

impl SetFilter for ReleaseCutoff {
    fn name(&self) -> &'static str {
        "release-cutoff"
    }

    fn includes(&self, set: &CatalogSet) -> bool {
        set.released_at.map_or(true, |date| date >= self.cutoff)
    }
}

#[derive(Default)]
pub struct SetFilterChain {
    filters: Vec<Box<dyn SetFilter>>,
}

impl SetFilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl SetFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn from_config(config: &BulkProcessingConfiguration) -> Self {
        let mut chain = Self::new()
            .with(DigitalExclusion)
            .with(CodeAllowList::new(&config.set_codes));
        if let Some(cutoff) = config.released_after {
            chain = chain.with(ReleaseCutoff::new(cutoff));
        }
        chain
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn should_include(&self, set: &CatalogSet) -> bool {
        for filter in &self.filters {
            if !filter.includes(set) {
                log::debug!("set {} excluded by {} filter", set.code, filter.name());
                return false;
            }
        }
        true
    }
}
