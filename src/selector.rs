use crate::filters::FilterSet;
use crate::ledger::Ledger;
use covphylo_protocol::Record;

/// Result of narrowing a fetched batch down to what still needs aligning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selected<'a> {
    /// Relevant, not yet incorporated records, in batch order.
    pub records: Vec<&'a Record>,
    pub already_incorporated: usize,
    pub filtered_out: usize,
}

impl Selected<'_> {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }
}

/// Keeps every record whose description passes `predicate` and whose id the
/// ledger has not seen. Duplicate ids inside one batch are passed through.
pub fn select<'a>(batch: &'a [Record], ledger: &Ledger, predicate: &FilterSet) -> Selected<'a> {
    let mut selected = Selected::default();
    for record in batch {
        if ledger.contains(&record.id) {
            selected.already_incorporated += 1;
            continue;
        }
        if !predicate.matches(&record.description) {
            selected.filtered_out += 1;
            continue;
        }
        selected.records.push(record);
    }
    selected
}
