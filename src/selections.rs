use crate::artifacts::validate_selection_name;
use crate::error::{AlignError, Result};
use crate::filters::{FilterSet, KeywordFilter};
use covphylo_protocol::FilterSpec;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

/// A named, independently tracked grouping of sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    name: String,
    filters: FilterSet,
}

impl Selection {
    pub fn new(name: &str, filters: FilterSet) -> Result<Self> {
        validate_selection_name(name)?;
        Ok(Self {
            name: name.to_string(),
            filters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn add_filter(&mut self, filter: KeywordFilter) {
        self.filters.push(filter);
    }
}

/// Catalog entry declaring which records belong to a selection.
#[derive(Default, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SelectionEntry {
    pub description: Option<String>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionCatalog {
    entries: BTreeMap<String, SelectionEntry>,
}

impl SelectionCatalog {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let entries: BTreeMap<String, SelectionEntry> = serde_json::from_str(text)
            .map_err(|e| AlignError::Config(format!("Could not parse selection catalog: {e}")))?;
        for name in entries.keys() {
            validate_selection_name(name)
                .map_err(|e| AlignError::Config(format!("Selection catalog: {e}")))?;
        }
        Ok(Self { entries })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            AlignError::Config(format!(
                "Could not read selection catalog '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&text).map_err(|e| match e {
            AlignError::Config(message) => {
                AlignError::Config(format!("{message} ('{}')", path.display()))
            }
            other => other,
        })
    }

    pub fn list_selections(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn entry(&self, name: &str) -> Option<&SelectionEntry> {
        self.entries.get(name)
    }

    pub fn selection(&self, name: &str) -> Result<Selection> {
        let entry = self.entries.get(name).ok_or_else(|| {
            AlignError::InvalidInput(format!("Selection '{name}' is not present in the catalog"))
        })?;
        Selection::new(name, FilterSet::from(entry.filters.clone()))
    }

    /// All selections, in name order.
    pub fn selections(&self) -> Result<Vec<Selection>> {
        self.entries
            .keys()
            .map(|name| self.selection(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covphylo_protocol::FilterMode;
    use tempfile::tempdir;

    const CATALOG: &str = r#"{
  "gene_N": {
    "description": "nucleocapsid gene",
    "filters": [
      {"mode": "all", "keywords": ["(N) gene"]},
      {"mode": "none", "keywords": ["partial"]}
    ]
  },
  "complete genome": {
    "filters": [{"mode": "any", "keywords": ["complete genome"]}]
  },
  "everything": {}
}"#;

    #[test]
    fn test_catalog_builds_selections_with_filters() {
        let catalog = SelectionCatalog::from_json_str(CATALOG).unwrap();
        assert_eq!(
            catalog.list_selections(),
            vec!["complete genome", "everything", "gene_N"]
        );
        let gene_n = catalog.selection("gene_N").unwrap();
        assert_eq!(gene_n.name(), "gene_N");
        assert_eq!(gene_n.filters().filters().len(), 2);
        assert_eq!(gene_n.filters().filters()[1].mode(), FilterMode::None);
        assert!(gene_n.filters().matches("(N) gene, complete cds"));
        assert!(!gene_n.filters().matches("(N) gene, partial cds"));

        assert!(catalog.selection("everything").unwrap().filters().is_empty());
        assert_eq!(catalog.selections().unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_selection_is_invalid_input() {
        let catalog = SelectionCatalog::from_json_str(CATALOG).unwrap();
        assert!(matches!(
            catalog.selection("gene_X"),
            Err(AlignError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bad_catalogs_are_config_errors() {
        assert!(matches!(
            SelectionCatalog::from_json_str(r#"{"../up": {}}"#),
            Err(AlignError::Config(_))
        ));
        assert!(matches!(
            SelectionCatalog::from_json_str(r#"{"gene_N": {"filters": [{"mode": "most"}]}}"#),
            Err(AlignError::Config(_))
        ));

        let td = tempdir().unwrap();
        let err = SelectionCatalog::from_json_file(&td.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, AlignError::Config(_)));
    }

    #[test]
    fn test_add_filter_tightens_selection() {
        let mut selection = Selection::new("gene_S", FilterSet::new()).unwrap();
        assert!(selection.filters().matches("anything"));
        selection.add_filter(KeywordFilter::any(["(S)"]));
        assert!(!selection.filters().matches("anything"));
        assert!(selection.filters().matches("glycoprotein (S) gene"));
    }
}
