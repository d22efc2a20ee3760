//! Extraction of the top holdings table from fund archive markup

use crate::core::fund::Holding;
use regex::Regex;
use std::sync::LazyLock;

pub const MAX_HOLDINGS: usize = 10;

static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr[\s\S]*?</tr>").expect("valid row pattern"));
static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td[^>]*>([\s\S]*?)</td>").expect("valid cell pattern"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));
static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{6}$").expect("valid code pattern"));
static WEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?\s*%").expect("valid weight pattern"));

/// Turns holdings markup into holdings, in document order.
pub trait HoldingsParser: Send + Sync {
    fn parse(&self, markup: &str) -> Vec<Holding>;
}

/// Scrapes `<tr>`/`<td>` rows with regular expressions.
///
/// A row is a holding when one cell is a six digit instrument code and
/// another carries a percentage; the cell after the code is its name.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableRowParser;

impl HoldingsParser for TableRowParser {
    fn parse(&self, markup: &str) -> Vec<Holding> {
        ROW_RE
            .find_iter(markup)
            .filter_map(|row| parse_row(row.as_str()))
            .take(MAX_HOLDINGS)
            .collect()
    }
}

fn parse_row(row: &str) -> Option<Holding> {
    let cells: Vec<String> = CELL_RE
        .captures_iter(row)
        .map(|c| TAG_RE.replace_all(&c[1], "").trim().to_string())
        .collect();

    let code_idx = cells.iter().position(|c| CODE_RE.is_match(c))?;
    let weight_idx = cells.iter().position(|c| WEIGHT_RE.is_match(c))?;

    Some(Holding {
        code: cells[code_idx].clone(),
        name: cells.get(code_idx + 1).cloned().unwrap_or_default(),
        weight: cells[weight_idx].clone(),
        change: None,
    })
}
