// src/catalog/resolver.rs
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::naming::{
    self, is_raster_candidate, DateKey, IndexName, NameParseError, PeriodKey, StatKey,
};
use crate::error::{ChvError, Result};

pub const MT_DIR: &str = "MTs";
pub const STM_DIR: &str = "STMs";

/// Entries discovered from one directory scan, plus the candidate files
/// whose names did not follow the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    pub entries: Vec<T>,
    pub rejected: Vec<NameParseError>,
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<T> Listing<T> {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn log_rejected(&self) {
        for err in &self.rejected {
            warn!(path = %err.path.display(), kind = %err.kind, "{}", err.reason);
        }
    }

    /// Fails on the first rejected name.
    pub fn strict(self) -> Result<Vec<T>> {
        match self.rejected.into_iter().next() {
            Some(err) => Err(err.into()),
            None => Ok(self.entries),
        }
    }
}

/// Read-only view over an input root holding `MTs/` and `STMs/`.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

/// Sorted names of the subdirectories of `dir`; empty when `dir` is absent.
fn subdirectories(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "directory not found");
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    names
}

fn raster_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_raster_candidate(path))
        .collect();
    files.sort();
    files
}

fn parse_all<T: Ord>(
    files: Vec<PathBuf>,
    parse: impl Fn(&Path) -> std::result::Result<T, NameParseError>,
) -> Listing<T> {
    let mut entries = BTreeSet::new();
    let mut rejected = Vec::new();
    for file in files {
        match parse(&file) {
            Ok(key) => {
                entries.insert(key);
            }
            Err(err) => rejected.push(err),
        }
    }
    Listing {
        entries: entries.into_iter().collect(),
        rejected,
    }
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn mt_root(&self) -> PathBuf {
        self.root.join(MT_DIR)
    }

    pub fn stm_root(&self) -> PathBuf {
        self.root.join(STM_DIR)
    }

    pub fn mt_path(&self, date: &DateKey, index: &IndexName) -> PathBuf {
        self.mt_root()
            .join(index.as_str())
            .join(naming::mt_file_name(date, index))
    }

    pub fn stm_path(&self, period: &PeriodKey, index: &IndexName, stat: &StatKey) -> PathBuf {
        self.stm_root()
            .join(period.as_str())
            .join(index.as_str())
            .join(naming::stm_file_name(period, index, stat))
    }

    /// All index directories under the MT root.
    pub fn list_indices(&self) -> Vec<IndexName> {
        subdirectories(&self.mt_root())
            .into_iter()
            .map(IndexName::new)
            .collect()
    }

    /// Dates of the first index; the other indices are assumed to share them.
    pub fn list_mt_dates(&self) -> Listing<DateKey> {
        match self.list_indices().first() {
            Some(index) => self.mt_dates_for(index),
            None => Listing::default(),
        }
    }

    fn mt_dates_for(&self, index: &IndexName) -> Listing<DateKey> {
        let files = raster_files(&self.mt_root().join(index.as_str()));
        parse_all(files, |path| naming::parse_mt_name(path, index))
    }

    pub fn list_stm_periods(&self) -> Vec<PeriodKey> {
        subdirectories(&self.stm_root())
            .into_iter()
            .map(PeriodKey::new)
            .collect()
    }

    fn stm_indices(&self, period: &PeriodKey) -> Vec<IndexName> {
        subdirectories(&self.stm_root().join(period.as_str()))
            .into_iter()
            .map(IndexName::new)
            .collect()
    }

    /// Stats of the first (period, index) pair.
    pub fn list_stm_stats(&self) -> Listing<StatKey> {
        let Some(period) = self.list_stm_periods().into_iter().next() else {
            return Listing::default();
        };
        match self.stm_indices(&period).first() {
            Some(index) => self.stm_stats_for(&period, index),
            None => Listing::default(),
        }
    }

    fn stm_stats_for(&self, period: &PeriodKey, index: &IndexName) -> Listing<StatKey> {
        let files = raster_files(&self.stm_root().join(period.as_str()).join(index.as_str()));
        parse_all(files, |path| naming::parse_stm_name(path, period, index))
    }

    /// Checks that every MT index carries the same dates and every
    /// (period, index) directory the same statistics, with no rejected names.
    pub fn check_uniform(&self) -> Result<()> {
        let date_sets = self
            .list_indices()
            .into_iter()
            .map(|index| -> Result<LabeledSet<DateKey>> {
                let dates = self.mt_dates_for(&index).strict()?;
                Ok((index.to_string(), dates))
            })
            .collect::<Result<Vec<_>>>()?;
        if let Some(((first, expected), (label, found))) = divergent(&date_sets) {
            return Err(ChvError::CatalogInconsistent(format!(
                "MT index {label} has dates {}, {first} has {}",
                keys(found),
                keys(expected)
            )));
        }

        let mut stat_sets = Vec::new();
        for period in self.list_stm_periods() {
            for index in self.stm_indices(&period) {
                let stats = self.stm_stats_for(&period, &index).strict()?;
                stat_sets.push((format!("{period}/{index}"), stats));
            }
        }
        if let Some(((first, expected), (label, found))) = divergent(&stat_sets) {
            return Err(ChvError::CatalogInconsistent(format!(
                "STM {label} has stats {}, {first} has {}",
                keys(found),
                keys(expected)
            )));
        }
        Ok(())
    }
}

type LabeledSet<T> = (String, Vec<T>);

/// The first set, and the first later set that differs from it.
fn divergent<T: PartialEq>(sets: &[LabeledSet<T>]) -> Option<(&LabeledSet<T>, &LabeledSet<T>)> {
    let first = sets.first()?;
    sets.iter().find(|(_, entries)| *entries != first.1).map(|other| (first, other))
}

fn keys<T: std::fmt::Display>(entries: &[T]) -> String {
    let keys: Vec<String> = entries.iter().map(ToString::to_string).collect();
    format!("[{}]", keys.join(", "))
}
