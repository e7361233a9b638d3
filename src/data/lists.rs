//! Static policy lists: extra anchors, the anchor denylist, and the
//! trusted observing nights.
//!
//! Plain text files, one identifier per line; blank lines and `#` comments
//! are skipped. All three lists are optional.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use crate::domain::{CalibConfig, RunId};
use crate::error::CalibError;

#[derive(Debug, Clone, Default)]
pub struct StaticLists {
    /// Runs forced into the anchor set.
    pub extra_anchors: HashSet<RunId>,
    /// Runs never allowed to anchor, regardless of other evidence.
    pub denylist: HashSet<RunId>,
    /// Nights whose runs are considered photometrically trustworthy.
    pub trusted_nights: HashSet<NaiveDate>,
}

impl StaticLists {
    pub fn load(config: &CalibConfig) -> Result<StaticLists, CalibError> {
        Ok(StaticLists {
            extra_anchors: read_run_ids(config.extra_anchors_path.as_deref())?,
            denylist: read_run_ids(config.denylist_path.as_deref())?,
            trusted_nights: read_nights(config.trusted_nights_path.as_deref())?,
        })
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, CalibError> {
    let text =
        fs::read_to_string(path).map_err(|e| CalibError::io("failed to read list", path, e))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_owned)
        .collect())
}

fn read_run_ids(path: Option<&Path>) -> Result<HashSet<RunId>, CalibError> {
    let Some(path) = path else {
        return Ok(HashSet::new());
    };
    let mut ids = HashSet::new();
    for line in read_lines(path)? {
        let id = line.parse::<RunId>().map_err(|e| {
            CalibError::InvalidInput(format!("bad run id '{line}' in '{}': {e}", path.display()))
        })?;
        ids.insert(id);
    }
    Ok(ids)
}

fn read_nights(path: Option<&Path>) -> Result<HashSet<NaiveDate>, CalibError> {
    let Some(path) = path else {
        return Ok(HashSet::new());
    };
    let mut nights = HashSet::new();
    for line in read_lines(path)? {
        let night = NaiveDate::parse_from_str(&line, "%Y%m%d").map_err(|e| {
            CalibError::InvalidInput(format!("bad night '{line}' in '{}': {e}", path.display()))
        })?;
        nights.insert(night);
    }
    Ok(nights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_ids_and_skips_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# forced anchors\n376022\n\n376023").unwrap();
        let ids = read_run_ids(Some(file.path())).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&RunId(376022)));
    }

    #[test]
    fn missing_path_means_empty_list() {
        assert!(read_run_ids(None).unwrap().is_empty());
        assert!(read_nights(None).unwrap().is_empty());
    }

    #[test]
    fn bad_id_is_invalid_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not-a-run").unwrap();
        let err = read_run_ids(Some(file.path())).unwrap_err();
        assert!(matches!(err, CalibError::InvalidInput(_)));
    }
}
