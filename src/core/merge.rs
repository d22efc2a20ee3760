use crate::core::fund::FundRecord;
use std::collections::HashSet;

/// Folds `fresh` into `previous`: an entry with the same code is replaced in
/// place, anything else is appended. The result is deduplicated by code.
pub fn merge(previous: &[FundRecord], fresh: &[FundRecord]) -> Vec<FundRecord> {
    let mut merged = previous.to_vec();
    for record in fresh {
        match merged.iter().position(|f| f.code == record.code) {
            Some(idx) => merged[idx] = record.clone(),
            None => merged.push(record.clone()),
        }
    }
    dedupe_by_code(merged)
}

/// Keeps the first record seen for each code. Records without a code are
/// dropped.
pub fn dedupe_by_code(records: Vec<FundRecord>) -> Vec<FundRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|f| !f.code.is_empty() && seen.insert(f.code.clone()))
        .collect()
}

/// Deduplicates codes, keeping the order in which they first appear.
pub fn unique_codes<I, S>(codes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    codes
        .into_iter()
        .filter_map(|c| {
            let code = c.as_ref().trim();
            (!code.is_empty() && seen.insert(code.to_string())).then(|| code.to_string())
        })
        .collect()
}
