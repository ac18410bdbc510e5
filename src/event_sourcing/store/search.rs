/// Bisection state over an inclusive offset range.
///
/// Pure value: every narrowing step returns a new strategy. The midpoint rounds
/// down on the initial range and after narrowing downward, and rounds up after
/// narrowing upward, so both directions always make progress. The search ends
/// when the midpoint lands on the upper bound, which has already been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinarySearchStrategy {
    range_start: i64,
    range_end: i64,
    round_up: bool,
}

impl BinarySearchStrategy {
    pub fn new(range_start: i64, range_end: i64) -> Self {
        Self {
            range_start,
            range_end,
            round_up: false,
        }
    }

    pub fn range(&self) -> (i64, i64) {
        (self.range_start, self.range_end)
    }

    pub fn next_offset_to_try(&self) -> Option<i64> {
        if self.range_start > self.range_end {
            return None;
        }

        let span = self.range_end - self.range_start;
        let half = if self.round_up { (span + 1) / 2 } else { span / 2 };
        let midpoint = self.range_start + half;

        if midpoint == self.range_end {
            None
        } else {
            Some(midpoint)
        }
    }

    /// Keep searching in `[range_start, midpoint]`
    pub fn search_lower(&self) -> Self {
        match self.next_offset_to_try() {
            Some(midpoint) => Self {
                range_start: self.range_start,
                range_end: midpoint,
                round_up: false,
            },
            None => *self,
        }
    }

    /// Keep searching in `[midpoint, range_end]`
    pub fn search_upper(&self) -> Self {
        match self.next_offset_to_try() {
            Some(midpoint) => Self {
                range_start: midpoint,
                range_end: self.range_end,
                round_up: true,
            },
            None => *self,
        }
    }
}
