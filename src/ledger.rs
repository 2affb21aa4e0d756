//! Per-selection record of which sequences are already aligned.
//!
//! One pretty-printed JSON file per selection. A missing file is the normal
//! first-run condition; anything unreadable is reported as corruption and
//! never mistaken for a fresh start.

use crate::artifacts::{part_path, validate_selection_name};
use crate::error::{AlignError, Result};
use crate::run_id::RunId;
use covphylo_protocol::LedgerSnapshot;
use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

pub const LEDGER_FILE_SUFFIX: &str = "_information.json";

/// Where a selection's alignment lineage currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineageHead {
    /// Nothing aligned yet; the next run aligns from scratch.
    Bootstrap,
    /// The newest successful alignment, to be extended by the next run.
    Incremental(RunId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    last_run_id: Option<RunId>,
    incorporated_ids: BTreeSet<String>,
}

impl Ledger {
    pub fn bootstrap() -> Self {
        Self::default()
    }

    pub fn head(&self) -> LineageHead {
        match &self.last_run_id {
            Some(run_id) => LineageHead::Incremental(run_id.clone()),
            None => LineageHead::Bootstrap,
        }
    }

    pub fn last_run_id(&self) -> Option<&RunId> {
        self.last_run_id.as_ref()
    }

    pub fn incorporated_ids(&self) -> &BTreeSet<String> {
        &self.incorporated_ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.incorporated_ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.incorporated_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incorporated_ids.is_empty()
    }

    /// The ledger after a successful run that aligned `new_ids`.
    pub fn advanced<'a, I>(&self, run_id: &RunId, new_ids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut incorporated_ids = self.incorporated_ids.clone();
        incorporated_ids.extend(new_ids.into_iter().map(str::to_string));
        Self {
            last_run_id: Some(run_id.clone()),
            incorporated_ids,
        }
    }

    pub fn to_snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            last_run_id: self.last_run_id.as_ref().map(|r| r.to_string()),
            incorporated_ids: self.incorporated_ids.iter().cloned().collect(),
        }
    }

    fn from_snapshot(snapshot: LedgerSnapshot, path: &Path) -> Result<Self> {
        let last_run_id = match snapshot.last_run_id {
            Some(text) => Some(RunId::parse(&text).map_err(|e| {
                AlignError::ledger_corrupt(path, format!("bad last_run_id: {e}"))
            })?),
            None => None,
        };
        let incorporated_ids: BTreeSet<String> = snapshot.incorporated_ids.into_iter().collect();
        match (&last_run_id, incorporated_ids.is_empty()) {
            (None, false) => Err(AlignError::ledger_corrupt(
                path,
                "incorporated ids are recorded without a last_run_id",
            )),
            (Some(run_id), true) => Err(AlignError::ledger_corrupt(
                path,
                format!("run '{run_id}' is recorded without any incorporated ids"),
            )),
            _ => Ok(Self {
                last_run_id,
                incorporated_ids,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStore {
    dir: PathBuf,
}

impl LedgerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, selection: &str) -> Result<PathBuf> {
        validate_selection_name(selection)?;
        Ok(self.dir.join(format!("{selection}{LEDGER_FILE_SUFFIX}")))
    }

    pub fn load(&self, selection: &str) -> Result<Ledger> {
        let path = self.path_for(selection)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(selection, "No ledger yet, starting from bootstrap");
                return Ok(Ledger::bootstrap());
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(AlignError::ledger_corrupt(&path, e.to_string()));
            }
            Err(e) => return Err(AlignError::artifact_io(&path, e)),
        };
        let snapshot: LedgerSnapshot = serde_json::from_str(&text)
            .map_err(|e| AlignError::ledger_corrupt(&path, e.to_string()))?;
        Ledger::from_snapshot(snapshot, &path)
    }

    /// Replaces the selection's ledger with `run_id` as head and
    /// `incorporated_ids` as the full id set.
    pub fn commit(
        &self,
        selection: &str,
        run_id: &RunId,
        incorporated_ids: &BTreeSet<String>,
    ) -> Result<()> {
        let ledger = Ledger {
            last_run_id: Some(run_id.clone()),
            incorporated_ids: incorporated_ids.clone(),
        };
        self.commit_ledger(selection, &ledger)
    }

    /// Writes `ledger` to a `.part` file, syncs it and renames it over the
    /// old one. A bootstrap or empty ledger is never written.
    pub fn commit_ledger(&self, selection: &str, ledger: &Ledger) -> Result<()> {
        let path = self.path_for(selection)?;
        let run_id = ledger.last_run_id().ok_or_else(|| {
            AlignError::InvalidInput(format!(
                "Cannot commit a bootstrap ledger for '{selection}'"
            ))
        })?;
        if ledger.is_empty() {
            return Err(AlignError::InvalidInput(format!(
                "Refusing to commit run '{run_id}' of '{selection}' with no incorporated ids"
            )));
        }
        let text = serde_json::to_string_pretty(&ledger.to_snapshot())
            .map_err(|e| AlignError::artifact_io(&path, e))?;

        fs::create_dir_all(&self.dir).map_err(|e| AlignError::artifact_io(&self.dir, e))?;
        let tmp_path = part_path(&path);
        let write_result = File::create(&tmp_path).and_then(|mut file| {
            file.write_all(text.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()
        });
        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(AlignError::artifact_io(&tmp_path, e));
        }
        fs::rename(&tmp_path, &path).map_err(|e| AlignError::artifact_io(&path, e))?;
        tracing::info!(
            selection,
            run_id = %run_id,
            incorporated = ledger.len(),
            "Committed ledger"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn r(text: &str) -> RunId {
        RunId::parse(text).unwrap()
    }

    #[test]
    fn test_missing_ledger_is_bootstrap() {
        let td = tempdir().unwrap();
        let store = LedgerStore::new(td.path().join("does-not-exist-yet"));
        let ledger = store.load("gene_N").unwrap();
        assert_eq!(ledger, Ledger::bootstrap());
        assert_eq!(ledger.head(), LineageHead::Bootstrap);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_commit_then_load_round_trips() {
        let td = tempdir().unwrap();
        let store = LedgerStore::new(td.path());
        store
            .commit("gene_N", &r("20200501120000"), &ids(&["c", "a", "b"]))
            .unwrap();
        let ledger = store.load("gene_N").unwrap();
        assert_eq!(ledger.last_run_id(), Some(&r("20200501120000")));
        assert_eq!(ledger.incorporated_ids(), &ids(&["a", "b", "c"]));
        assert_eq!(
            ledger.head(),
            LineageHead::Incremental(r("20200501120000"))
        );
        assert!(!part_path(&store.path_for("gene_N").unwrap()).exists());
    }

    #[test]
    fn test_commit_is_idempotent() {
        let td = tempdir().unwrap();
        let store = LedgerStore::new(td.path());
        let path = store.path_for("gene_S").unwrap();
        store
            .commit("gene_S", &r("20200501120000"), &ids(&["x", "y"]))
            .unwrap();
        let first = fs::read(&path).unwrap();
        store
            .commit("gene_S", &r("20200501120000"), &ids(&["y", "x"]))
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_file_format_is_plain_json() {
        let td = tempdir().unwrap();
        let store = LedgerStore::new(td.path());
        store
            .commit("gene_N", &r("20200501120000"), &ids(&["b", "a"]))
            .unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path_for("gene_N").unwrap()).unwrap())
                .unwrap();
        assert_eq!(value["last_run_id"], "20200501120000");
        assert_eq!(value["incorporated_ids"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_selections_do_not_share_ledgers() {
        let td = tempdir().unwrap();
        let store = LedgerStore::new(td.path());
        store
            .commit("gene_N", &r("20200501120000"), &ids(&["a"]))
            .unwrap();
        assert_eq!(store.load("gene_S").unwrap(), Ledger::bootstrap());
    }

    #[test]
    fn test_malformed_ledger_is_corrupt_not_bootstrap() {
        let td = tempdir().unwrap();
        let store = LedgerStore::new(td.path());
        let path = store.path_for("gene_N").unwrap();

        for content in [
            "",
            "{\"last_run_id\": \"2020",
            "[]",
            r#"{"last_run_id": "yesterday", "incorporated_ids": ["a"]}"#,
            r#"{"last_run_id": null, "incorporated_ids": ["a"]}"#,
            r#"{"last_run_id": "20200501120000", "incorporated_ids": []}"#,
        ] {
            fs::write(&path, content).unwrap();
            let err = store.load("gene_N").unwrap_err();
            assert!(
                matches!(err, AlignError::LedgerCorrupt { .. }),
                "{content:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_explicit_bootstrap_document_loads() {
        let td = tempdir().unwrap();
        let store = LedgerStore::new(td.path());
        fs::write(
            store.path_for("gene_N").unwrap(),
            r#"{"last_run_id": null, "incorporated_ids": []}"#,
        )
        .unwrap();
        assert_eq!(store.load("gene_N").unwrap(), Ledger::bootstrap());
    }

    #[test]
    fn test_advanced_only_grows() {
        let before = Ledger::bootstrap().advanced(&r("20200501120000"), ["a", "b"]);
        let after = before.advanced(&r("20200502120000"), ["b", "c"]);
        assert!(before.incorporated_ids().is_subset(after.incorporated_ids()));
        assert_eq!(after.len(), 3);
        assert_eq!(after.last_run_id(), Some(&r("20200502120000")));
    }

    #[test]
    fn test_commit_refuses_empty_id_set() {
        let td = tempdir().unwrap();
        let store = LedgerStore::new(td.path());
        assert!(store
            .commit("gene_N", &r("20200501120000"), &BTreeSet::new())
            .is_err());
        assert!(store.commit_ledger("gene_N", &Ledger::bootstrap()).is_err());
        assert!(!store.path_for("gene_N").unwrap().exists());
    }
}
