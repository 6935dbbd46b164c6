//! Identity assertion helpers with diagnostic output.
//!
//! Every failure names the context and shows what was found.

use std::collections::HashSet;

use shape_identity::{DiagnosticKind, Diagnostics, ShapeIdentityTable};
use uuid::Uuid;

use crate::helpers::{missing_ids, HarnessError};

/// Assert every record has an id and no two records share one.
pub fn assert_ids_well_formed(table: &ShapeIdentityTable, ctx: &str) -> Result<(), HarnessError> {
    let nils: Vec<String> = table
        .records()
        .iter()
        .filter(|r| r.id.is_none())
        .map(|r| format!("{} at {}", r.kind, r.offset))
        .collect();
    if !nils.is_empty() {
        return Err(HarnessError::AssertionFailed {
            detail: format!("[{}] {} records without id: {}", ctx, nils.len(), nils.join(", ")),
        });
    }

    let mut seen = HashSet::new();
    let duplicates: Vec<Uuid> = table
        .get_all_ids()
        .into_iter()
        .filter(|id| !seen.insert(*id))
        .collect();
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!("[{}] duplicate ids: {:?}", ctx, duplicates),
        })
    }
}

/// Assert two id lists are identical, position by position.
pub fn assert_ids_stable(before: &[Uuid], after: &[Uuid], ctx: &str) -> Result<(), HarnessError> {
    if before == after {
        return Ok(());
    }
    Err(HarnessError::AssertionFailed {
        detail: format!(
            "[{}] ids changed: {} before, {} after, lost {:?}, gained {:?}",
            ctx,
            before.len(),
            after.len(),
            missing_ids(before, after),
            missing_ids(after, before),
        ),
    })
}

/// Assert exactly `expected` diagnostics of `kind` were reported.
pub fn assert_diagnostic_count(
    diagnostics: &Diagnostics,
    kind: DiagnosticKind,
    expected: usize,
    ctx: &str,
) -> Result<(), HarnessError> {
    let actual = diagnostics.count(kind);
    if actual == expected {
        return Ok(());
    }
    let messages: Vec<&str> = diagnostics
        .of_kind(kind)
        .map(|d| d.message.as_str())
        .collect();
    Err(HarnessError::AssertionFailed {
        detail: format!(
            "[{}] expected {} {:?} diagnostics, got {}: {:?}",
            ctx, expected, kind, actual, messages
        ),
    })
}
