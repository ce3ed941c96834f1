//! Canonical identifier handling for provisions.
//!
//! A provision has two equivalent identifiers:
//!
//! - the **ref-id**, the external citation form
//!   `CORPUS_ID ":" KIND (":" SUBKIND)? ":" LOCAL_ID`, and
//! - the **internal-id**, derived from the ref-id by replacing `:` and `/`
//!   with `_`.
//!
//! `ITAA1997:Section:6-5` ↔ `ITAA1997_Section_6-5`. The derivation is
//! bit-exact and reversible as long as corpus ids never contain `_`-escaped
//! separators themselves, which ingest guarantees.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Structural kind of a provision. The set is closed; `Schedule` may carry a
/// subkind segment in its ref-id (`TAA1953:Schedule:1:Section:12-5` is a
/// `Schedule` ref with subkind `1:Section`).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProvisionKind {
    Act,
    Chapter,
    Part,
    Division,
    Subdivision,
    Section,
    Definition,
    Schedule,
    Guide,
}

impl ProvisionKind {
    /// All kinds, in ambiguity-resolution order: when a bare local id matches
    /// provisions of several kinds, the earliest kind here wins.
    pub const LOOKUP_ORDER: [ProvisionKind; 4] = [
        ProvisionKind::Section,
        ProvisionKind::Subdivision,
        ProvisionKind::Division,
        ProvisionKind::Part,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionKind::Act => "Act",
            ProvisionKind::Chapter => "Chapter",
            ProvisionKind::Part => "Part",
            ProvisionKind::Division => "Division",
            ProvisionKind::Subdivision => "Subdivision",
            ProvisionKind::Section => "Section",
            ProvisionKind::Definition => "Definition",
            ProvisionKind::Schedule => "Schedule",
            ProvisionKind::Guide => "Guide",
        }
    }
}

impl fmt::Display for ProvisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Act" => Ok(ProvisionKind::Act),
            "Chapter" => Ok(ProvisionKind::Chapter),
            "Part" => Ok(ProvisionKind::Part),
            "Division" => Ok(ProvisionKind::Division),
            "Subdivision" => Ok(ProvisionKind::Subdivision),
            "Section" => Ok(ProvisionKind::Section),
            "Definition" => Ok(ProvisionKind::Definition),
            "Schedule" => Ok(ProvisionKind::Schedule),
            "Guide" => Ok(ProvisionKind::Guide),
            _ => Err(()),
        }
    }
}

/// A parsed ref-id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefId {
    pub corpus_id: String,
    pub kind: ProvisionKind,
    /// Extra segments between the kind and the local id, only ever present on
    /// `Schedule` refs (e.g. `1:Section`).
    pub subkind: Option<String>,
    pub local_id: String,
}

impl RefId {
    pub fn new(corpus_id: &str, kind: ProvisionKind, local_id: &str) -> Self {
        Self {
            corpus_id: corpus_id.to_string(),
            kind,
            subkind: None,
            local_id: local_id.to_string(),
        }
    }

    /// Parse `CORPUS:KIND[:SUBKIND…]:LOCAL`. Returns `None` when the kind is
    /// not in the closed set or the segment count is wrong.
    pub fn parse(ref_id: &str) -> Option<Self> {
        let parts: Vec<&str> = ref_id.split(':').collect();
        if parts.len() < 3 {
            return None;
        }
        let kind = ProvisionKind::from_str(parts[1]).ok()?;
        if parts.len() == 3 {
            return Some(Self {
                corpus_id: parts[0].to_string(),
                kind,
                subkind: None,
                local_id: parts[2].to_string(),
            });
        }
        // Only Schedule refs carry intermediate segments.
        if kind != ProvisionKind::Schedule {
            return None;
        }
        let last = parts.len() - 1;
        Some(Self {
            corpus_id: parts[0].to_string(),
            kind,
            subkind: Some(parts[2..last].join(":")),
            local_id: parts[last].to_string(),
        })
    }

    /// The derived internal id (`:` and `/` escaped to `_`).
    pub fn internal_id(&self) -> String {
        internal_id_from_ref(&self.to_string())
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subkind {
            Some(sub) => write!(
                f,
                "{}:{}:{}:{}",
                self.corpus_id, self.kind, sub, self.local_id
            ),
            None => write!(f, "{}:{}:{}", self.corpus_id, self.kind, self.local_id),
        }
    }
}

/// Escape a ref-id into its internal form.
pub fn internal_id_from_ref(ref_id: &str) -> String {
    ref_id.replace(':', "_").replace('/', "_")
}

/// Normalize a user-supplied local id: uppercase, `.` and spaces to `-`,
/// collapse repeated dashes, trim leading/trailing dashes. Returns `None` for
/// inputs that normalize away entirely.
pub fn normalize_local_id(raw: &str) -> Option<String> {
    let mut value = raw.trim().to_string();
    if value.is_empty() {
        return None;
    }
    value = value.replace(['\u{2013}', '\u{2014}'], "-");
    value = value.replace(['.', ' '], "-");
    let mut collapsed = String::with_capacity(value.len());
    let mut last_dash = false;
    for ch in value.chars() {
        if ch == '-' {
            if !last_dash {
                collapsed.push('-');
            }
            last_dash = true;
        } else {
            collapsed.push(ch);
            last_dash = false;
        }
    }
    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_uppercase())
}
