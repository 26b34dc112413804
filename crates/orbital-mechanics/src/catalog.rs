//! Two- and three-line element catalogs.

use std::path::Path;

use crate::{OrbitalError, Result, Satellite};

#[derive(Debug, Clone, Default)]
pub struct TleCatalog {
    satellites: Vec<Satellite>,
}

impl TleCatalog {
    /// Parse catalog text. Entries may carry a name line; lines that start
    /// with `1 ` must be followed by their `2 ` line.
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .collect();

        let mut satellites = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let (name, l1_idx) = if lines[i].starts_with("1 ") {
                (None, i)
            } else {
                (Some(lines[i].trim().to_string()), i + 1)
            };
            let l1 = lines
                .get(l1_idx)
                .filter(|l| l.starts_with("1 "))
                .ok_or_else(|| OrbitalError::InvalidTle(format!("line {}: expected line 1", l1_idx + 1)))?;
            let l2 = lines
                .get(l1_idx + 1)
                .filter(|l| l.starts_with("2 "))
                .ok_or_else(|| OrbitalError::InvalidTle(format!("line {}: expected line 2", l1_idx + 2)))?;

            let norad_id = parse_norad_id(l1)?;
            satellites.push(Satellite {
                norad_id,
                name: name.unwrap_or_else(|| norad_id.to_string()),
                tle_line1: l1.to_string(),
                tle_line2: l2.to_string(),
            });
            i = l1_idx + 2;
        }

        tracing::debug!("parsed {} element sets", satellites.len());
        Ok(Self { satellites })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Find a satellite by NORAD id or case-insensitive name.
    pub fn find(&self, query: &str) -> Result<&Satellite> {
        let query = query.trim();
        let by_id = query.parse::<u32>().ok();
        self.satellites
            .iter()
            .find(|s| Some(s.norad_id) == by_id || s.name.eq_ignore_ascii_case(query))
            .ok_or_else(|| OrbitalError::TargetNotFound(query.to_string()))
    }

    pub fn len(&self) -> usize {
        self.satellites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.satellites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Satellite> {
        self.satellites.iter()
    }
}

fn parse_norad_id(line1: &str) -> Result<u32> {
    line1
        .get(2..7)
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| OrbitalError::InvalidTle(format!("bad catalog number in {:?}", line1)))
}
