//! Explicit instrument lists for "specific" backtests.

use crate::domain::error::PortfolioError;
use std::collections::HashSet;

/// Parses a comma-separated list of instrument names.
///
/// Names are trimmed but otherwise kept verbatim; empty entries and
/// duplicates are rejected.
pub fn parse_names(input: &str) -> Result<Vec<String>, PortfolioError> {
    names_from(input.split(','))
}

/// Same rules as [`parse_names`] for an already-split list.
pub fn names_from<I, S>(items: I) -> Result<Vec<String>, PortfolioError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names = Vec::new();
    let mut seen = HashSet::new();

    for item in items {
        let trimmed = item.as_ref().trim();
        if trimmed.is_empty() {
            return Err(PortfolioError::validation("names", "empty entry in list"));
        }
        if !seen.insert(trimmed.to_string()) {
            return Err(PortfolioError::validation(
                "names",
                format!("duplicate name: {trimmed}"),
            ));
        }
        names.push(trimmed.to_string());
    }

    if names.is_empty() {
        return Err(PortfolioError::validation("names", "no instruments given"));
    }
    Ok(names)
}
