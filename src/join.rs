//! Left join of auxiliary date-keyed tables onto a base table.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::frame::DateFrame;

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("column {column} already exists in the joined table")]
    ColumnCollision { column: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinReport {
    pub base_rows: u64,
    pub auxiliary_tables: u64,
    pub columns_added: u64,
    pub zero_filled_cells: u64,
}

// Keeps every base row and only base rows. Columns of each auxiliary table
// are appended in argument order; a base date with no auxiliary row, or a
// non-finite auxiliary value, becomes 0.
pub fn join_sources(
    base: &DateFrame,
    auxiliaries: &[&DateFrame],
) -> Result<(DateFrame, JoinReport), JoinError> {
    let mut columns: Vec<String> = base.columns().to_vec();
    for aux in auxiliaries {
        for column in aux.columns() {
            if columns.contains(column) {
                return Err(JoinError::ColumnCollision {
                    column: column.clone(),
                });
            }
            columns.push(column.clone());
        }
    }

    let mut zero_filled_cells = 0u64;
    let rows = base
        .iter()
        .map(|(date, base_row)| {
            let mut values = Vec::with_capacity(columns.len());
            values.extend_from_slice(base_row);
            for aux in auxiliaries {
                match aux.row(date) {
                    Some(aux_row) => values.extend(aux_row.iter().map(|v| {
                        if v.is_finite() {
                            *v
                        } else {
                            zero_filled_cells += 1;
                            0.0
                        }
                    })),
                    None => {
                        zero_filled_cells += aux.columns().len() as u64;
                        values.extend(std::iter::repeat(0.0).take(aux.columns().len()));
                    }
                }
            }
            (date, values)
        })
        .collect();

    let report = JoinReport {
        base_rows: base.len() as u64,
        auxiliary_tables: auxiliaries.len() as u64,
        columns_added: (columns.len() - base.columns().len()) as u64,
        zero_filled_cells,
    };

    info!(
        component = "join",
        event = "join.finish",
        base_rows = report.base_rows,
        auxiliary_tables = report.auxiliary_tables,
        columns_added = report.columns_added,
        zero_filled_cells = report.zero_filled_cells
    );

    Ok((DateFrame::from_parts(columns, rows), report))
}
