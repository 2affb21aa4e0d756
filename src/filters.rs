//! Keyword predicates over record descriptions.
//!
//! Matching is case-sensitive substring containment. A selection combines its
//! filters by conjunction; an empty [`FilterSet`] accepts every description.

use covphylo_protocol::{FilterMode, FilterSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordFilter {
    mode: FilterMode,
    keywords: Vec<String>,
}

impl KeywordFilter {
    pub fn new<I, S>(mode: FilterMode, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode,
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }

    pub fn all<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(FilterMode::All, keywords)
    }

    pub fn any<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(FilterMode::Any, keywords)
    }

    pub fn none<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(FilterMode::None, keywords)
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn matches(&self, description: &str) -> bool {
        let mut hits = self
            .keywords
            .iter()
            .map(|keyword| description.contains(keyword.as_str()));
        match self.mode {
            FilterMode::All => hits.all(|hit| hit),
            FilterMode::Any => hits.any(|hit| hit),
            FilterMode::None => !hits.any(|hit| hit),
        }
    }

    pub fn to_spec(&self) -> FilterSpec {
        FilterSpec {
            mode: self.mode,
            keywords: self.keywords.clone(),
        }
    }
}

impl From<FilterSpec> for KeywordFilter {
    fn from(spec: FilterSpec) -> Self {
        Self {
            mode: spec.mode,
            keywords: spec.keywords,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    filters: Vec<KeywordFilter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: KeywordFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn push(&mut self, filter: KeywordFilter) {
        self.filters.push(filter);
    }

    pub fn filters(&self) -> &[KeywordFilter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn matches(&self, description: &str) -> bool {
        self.filters.iter().all(|f| f.matches(description))
    }
}

impl FromIterator<KeywordFilter> for FilterSet {
    fn from_iter<T: IntoIterator<Item = KeywordFilter>>(iter: T) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<FilterSpec>> for FilterSet {
    fn from(specs: Vec<FilterSpec>) -> Self {
        specs.into_iter().map(KeywordFilter::from).collect()
    }
}
