//! Per-field majority voting over same-shaped records.
//!
//! Each field is decided independently: the value with the highest number of
//! occurrences wins, and ties go to the value that appeared first. Ballots are
//! tallied in a counting list kept in first-seen order.

/// A record whose fields can be decided by majority vote.
pub trait FieldVote: Sized {
    /// Collapse `ballots` into one record, field by field.
    ///
    /// Returns `None` when `ballots` is empty.
    fn elect(ballots: &[Self]) -> Option<Self>;
}

/// Aggregate a sequence of records into a single record by per-field vote.
///
/// Returns `None` for an empty input.
#[must_use]
pub fn aggregate<T: FieldVote>(records: &[T]) -> Option<T> {
    T::elect(records)
}

/// Return the most frequent value, preferring the earliest on ties.
pub fn majority<'a, T, I>(values: I) -> Option<&'a T>
where
    T: PartialEq + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut tally: Vec<(&'a T, usize)> = Vec::new();
    for value in values {
        match tally.iter_mut().find(|(seen, _)| *seen == value) {
            Some((_, count)) => *count += 1,
            None => tally.push((value, 1)),
        }
    }

    let mut winner: Option<(&'a T, usize)> = None;
    for (value, count) in tally {
        // Strictly greater keeps the first-seen value on a tie.
        if winner.is_none_or(|(_, best)| count > best) {
            winner = Some((value, count));
        }
    }
    winner.map(|(value, _)| value)
}
