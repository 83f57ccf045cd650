//! Decomposition of dirty product titles.
//!
//! Handles titles the way pharmacy spreadsheets write them:
//! `ACICLOVIR 200 MG X25 COMP LAB CHILE.` yields name `ACICLOVIR`, dose
//! `200 MG`, quantity `25 COMP` and lab `CHILE.`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Lab placeholder when the title names none.
pub const UNKNOWN_LAB: &str = "NO IDENTIFICADO";

/// Strength, e.g. `500 MG`, `0.5 %`, `1000 UI`.
static DOSE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(MG|G|GR|MCG|ML|%|UI|GRS)").unwrap()
});

/// Pack size, e.g. `X20 COMP`, `ENV 30 SOBRE`, `100 ML`.
static QUANTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:X\s*|ENV\s*|^|\s)(\d+)\s*(COMP|CAP|SOBRE|ML|AMPOLLA|FRASCO|UNID|UND|DOSIS|G)")
        .unwrap()
});

/// Laboratory suffix, e.g. `LAB. CHILE`, `LABORATORIO MINTLAB`, `LAB SOPHIA`.
static LAB_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:LAB\.|LABORATORIO|LAB)\s+(.*)$").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Stray pack markers left behind after quantity extraction.
static PACK_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bX\d+\b").unwrap());

/// A number with its unit as written in the title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    /// Decimal commas are normalized to points.
    pub value: String,
    pub unit: String,
}

impl std::fmt::Display for Measure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Structured view of a product title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTitle {
    /// Uppercased, trimmed input.
    pub original: String,
    /// What remains once lab, dose and quantity are removed.
    pub clean_name: String,
    pub dose: Option<Measure>,
    pub quantity: Option<Measure>,
    /// Lab name, or [`UNKNOWN_LAB`].
    pub lab: String,
}

impl ParsedTitle {
    /// Lab if the title actually named one.
    pub fn known_lab(&self) -> Option<&str> {
        (self.lab != UNKNOWN_LAB).then_some(self.lab.as_str())
    }
}

/// Parse a raw title. Never fails; unrecognized parts stay in `clean_name`.
pub fn parse_title(raw: &str) -> ParsedTitle {
    let original = raw.trim().to_uppercase();
    let mut text = original.clone();

    let mut lab = UNKNOWN_LAB.to_string();
    if let Some(caps) = LAB_PATTERN.captures(&text) {
        let whole = caps[0].to_string();
        let name = caps[1].trim();
        if !name.is_empty() {
            lab = name.to_string();
        }
        text = text.replace(&whole, "");
    }

    let mut dose = None;
    if let Some(caps) = DOSE_PATTERN.captures(&text) {
        let whole = caps[0].to_string();
        dose = Some(Measure {
            value: caps[1].replace(',', "."),
            unit: caps[2].to_string(),
        });
        text = text.replace(&whole, " ");
    }

    let mut quantity = None;
    if let Some(caps) = QUANTITY_PATTERN.captures(&text) {
        let whole = caps[0].to_string();
        quantity = Some(Measure {
            value: caps[1].to_string(),
            unit: caps[2].to_string(),
        });
        text = text.replace(&whole, " ");
    }

    let collapsed = WHITESPACE.replace_all(&text, " ");
    let stripped = PACK_MARKER.replace_all(collapsed.trim(), "");
    let clean_name = WHITESPACE.replace_all(stripped.trim(), " ").into_owned();

    ParsedTitle {
        original,
        clean_name,
        dose,
        quantity,
        lab,
    }
}
