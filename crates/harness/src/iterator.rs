//! Expansion of declared cases into the run order.

use std::collections::VecDeque;

use crate::case::TestCase;

/// Consuming, single-pass iterator over declared cases.
///
/// Declaration order is preserved. A case with `duplicate(n)` yields `n`
/// copies in a row, named `<name>-<i>` with workflows `<workflow>-<i>`.
pub struct TestIterator {
    cases: VecDeque<TestCase>,
    /// Copies still owed for the case at the front of `cases`.
    copy: Option<(usize, usize)>,
}

impl TestIterator {
    pub fn new(cases: Vec<TestCase>) -> Self {
        Self {
            cases: cases.into(),
            copy: None,
        }
    }
}

impl Iterator for TestIterator {
    type Item = TestCase;

    fn next(&mut self) -> Option<TestCase> {
        loop {
            let front = self.cases.front()?;
            let Some(count) = front.options().duplicate else {
                return self.cases.pop_front();
            };

            let (index, total) = *self.copy.get_or_insert((0, count));
            if index < total {
                self.copy = Some((index + 1, total));
                return Some(front.duplicate_copy(index));
            }
            self.copy = None;
            self.cases.pop_front();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining: usize = self
            .cases
            .iter()
            .map(|c| c.options().duplicate.unwrap_or(1))
            .sum();
        let done = self.copy.map_or(0, |(index, _)| index);
        let exact = remaining - done;
        (exact, Some(exact))
    }
}
