// src/catalog/naming.rs
//! File naming grammar for the input catalog.
//!
//! MT layers:  `{date}_{index}.tif`
//! STM layers: `{period}_{index}_{stat}_masked.tif`
//!
//! `date` and `stat` are free tokens (non-empty, no `_`). The index and
//! period parts are not parsed out of the name, they must equal the
//! directories the file was found in.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

pub const RASTER_EXT: &str = ".tif";
pub const STM_SUFFIX: &str = "_masked.tif";

macro_rules! key_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

key_type!(
    /// Vegetation index name, one subdirectory of the MT root
    IndexName
);
key_type!(DateKey);
key_type!(PeriodKey);
key_type!(StatKey);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileKind {
    Mt,
    Stm,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Mt => f.write_str("MT"),
            FileKind::Stm => f.write_str("STM"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} file name {path} rejected: {reason}")]
pub struct NameParseError {
    pub path: PathBuf,
    pub kind: FileKind,
    pub reason: String,
}

impl NameParseError {
    fn new(path: &Path, kind: FileKind, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            reason: reason.into(),
        }
    }
}

fn file_name(path: &Path, kind: FileKind) -> Result<&str, NameParseError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| NameParseError::new(path, kind, "file name is not valid UTF-8"))
}

fn token<'a>(
    value: &'a str,
    path: &Path,
    kind: FileKind,
    what: &str,
) -> Result<&'a str, NameParseError> {
    if value.is_empty() {
        return Err(NameParseError::new(path, kind, format!("empty {what}")));
    }
    if value.contains('_') {
        return Err(NameParseError::new(
            path,
            kind,
            format!("{what} `{value}` contains `_`"),
        ));
    }
    Ok(value)
}

/// Only `.tif` files are catalog candidates; everything else is ignored.
pub fn is_raster_candidate(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.ends_with(RASTER_EXT))
        .unwrap_or(false)
}

/// Parse the date out of `{date}_{index}.tif`.
pub fn parse_mt_name(path: &Path, index: &IndexName) -> Result<DateKey, NameParseError> {
    let name = file_name(path, FileKind::Mt)?;
    let suffix = format!("_{index}{RASTER_EXT}");
    let date = name.strip_suffix(suffix.as_str()).ok_or_else(|| {
        NameParseError::new(path, FileKind::Mt, format!("expected suffix `{suffix}`"))
    })?;
    token(date, path, FileKind::Mt, "date").map(DateKey::from)
}

/// Parse the statistic out of `{period}_{index}_{stat}_masked.tif`.
pub fn parse_stm_name(
    path: &Path,
    period: &PeriodKey,
    index: &IndexName,
) -> Result<StatKey, NameParseError> {
    let name = file_name(path, FileKind::Stm)?;
    let prefix = format!("{period}_{index}_");
    let rest = name.strip_prefix(prefix.as_str()).ok_or_else(|| {
        NameParseError::new(path, FileKind::Stm, format!("expected prefix `{prefix}`"))
    })?;
    let stat = rest.strip_suffix(STM_SUFFIX).ok_or_else(|| {
        NameParseError::new(path, FileKind::Stm, format!("expected suffix `{STM_SUFFIX}`"))
    })?;
    token(stat, path, FileKind::Stm, "statistic").map(StatKey::from)
}

pub fn mt_file_name(date: &DateKey, index: &IndexName) -> String {
    format!("{date}_{index}{RASTER_EXT}")
}

pub fn stm_file_name(period: &PeriodKey, index: &IndexName, stat: &StatKey) -> String {
    format!("{period}_{index}_{stat}{STM_SUFFIX}")
}

pub fn mt_output_name(date: &DateKey) -> String {
    format!("CHV_MTs_{date}{RASTER_EXT}")
}

pub fn stm_output_name(period: &PeriodKey, stat: &StatKey) -> String {
    format!("CHV_STMs_{period}_{stat}{RASTER_EXT}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mt_name() {
        let index = IndexName::from("NDVI");
        let date = parse_mt_name(Path::new("MTs/NDVI/20210512_NDVI.tif"), &index).unwrap();
        assert_eq!(date.as_str(), "20210512");
    }

    #[test]
    fn test_mt_name_must_match_index_directory() {
        let index = IndexName::from("NDVI");
        let err = parse_mt_name(Path::new("20210512_EVI.tif"), &index).unwrap_err();
        assert_eq!(err.kind, FileKind::Mt);
        assert!(err.reason.contains("_NDVI.tif"));
    }

    #[test]
    fn test_mt_name_rejects_empty_or_compound_date() {
        let index = IndexName::from("NDVI");
        assert!(parse_mt_name(Path::new("_NDVI.tif"), &index).is_err());
        assert!(parse_mt_name(Path::new("2021_05_NDVI.tif"), &index).is_err());
    }

    #[test]
    fn test_index_names_with_underscores() {
        let index = IndexName::from("RE_NDVI");
        let date = parse_mt_name(Path::new("20210512_RE_NDVI.tif"), &index).unwrap();
        assert_eq!(date.as_str(), "20210512");

        let period = PeriodKey::from("0506");
        let stat = parse_stm_name(Path::new("0506_RE_NDVI_median_masked.tif"), &period, &index)
            .unwrap();
        assert_eq!(stat.as_str(), "median");
    }

    #[test]
    fn test_parse_stm_name() {
        let period = PeriodKey::from("0506");
        let index = IndexName::from("EVI");
        let stat = parse_stm_name(Path::new("0506_EVI_maximum_masked.tif"), &period, &index)
            .unwrap();
        assert_eq!(stat.as_str(), "maximum");

        let err = parse_stm_name(Path::new("0506_EVI_maximum.tif"), &period, &index).unwrap_err();
        assert!(err.reason.contains(STM_SUFFIX));

        let err = parse_stm_name(Path::new("0708_EVI_maximum_masked.tif"), &period, &index)
            .unwrap_err();
        assert!(err.reason.contains("prefix"));
    }

    #[test]
    fn test_file_names_round_trip_through_grammar() {
        let period = PeriodKey::from("0506");
        let index = IndexName::from("EVI");
        let stat = StatKey::from("p90");
        let name = stm_file_name(&period, &index, &stat);
        assert_eq!(name, "0506_EVI_p90_masked.tif");
        assert_eq!(parse_stm_name(Path::new(&name), &period, &index).unwrap(), stat);

        assert_eq!(mt_output_name(&DateKey::from("20210512")), "CHV_MTs_20210512.tif");
        assert_eq!(
            stm_output_name(&period, &StatKey::from("maximum")),
            "CHV_STMs_0506_maximum.tif"
        );
    }

    #[test]
    fn test_raster_candidates() {
        assert!(is_raster_candidate(Path::new("a/b/20210512_NDVI.tif")));
        assert!(!is_raster_candidate(Path::new("a/b/20210512_NDVI.tif.aux.xml")));
        assert!(!is_raster_candidate(Path::new("a/b/readme.txt")));
    }
}
