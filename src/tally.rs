//! Homomorphic aggregation of ciphertexts.

use crate::{group::GroupParams, Ciphertext};

/// Error aggregating rows of ciphertexts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TallyError {
    /// A row has a different width than the first row.
    #[error("row #{row} has {actual} ciphertexts, expected {expected}")]
    WidthMismatch {
        /// Zero-based index of the offending row.
        row: usize,
        /// Width of the first row.
        expected: usize,
        /// Width of the offending row.
        actual: usize,
    },
}

/// Aggregates ciphertexts by component-wise multiplication modulo `p`.
///
/// For exponential encoding, the result encrypts the sum of the encrypted values.
/// An empty input yields the identity ciphertext `(1, 1)`.
pub fn aggregate_ciphertexts<'a, I>(params: &GroupParams, ciphertexts: I) -> Ciphertext
where
    I: IntoIterator<Item = &'a Ciphertext>,
{
    ciphertexts
        .into_iter()
        .fold(Ciphertext::identity(), |mut acc, ciphertext| {
            acc.combine_assign(ciphertext, params);
            acc
        })
}

/// Aggregates rows of ciphertexts column-wise, producing one ciphertext per column.
/// An empty list of rows yields an empty list of columns.
///
/// # Errors
///
/// Returns an error if rows have unequal widths. Aligning columns (e.g., by ordering ballot
/// options canonically) is the caller's responsibility.
pub fn aggregate_votes<R>(params: &GroupParams, rows: &[R]) -> Result<Vec<Ciphertext>, TallyError>
where
    R: AsRef<[Ciphertext]>,
{
    let Some(first_row) = rows.first() else {
        return Ok(Vec::new());
    };
    let width = first_row.as_ref().len();
    let mut columns = vec![Ciphertext::identity(); width];

    for (i, row) in rows.iter().enumerate() {
        let row = row.as_ref();
        if row.len() != width {
            return Err(TallyError::WidthMismatch {
                row: i,
                expected: width,
                actual: row.len(),
            });
        }
        for (column, ciphertext) in columns.iter_mut().zip(row) {
            column.combine_assign(ciphertext, params);
        }
    }
    Ok(columns)
}
