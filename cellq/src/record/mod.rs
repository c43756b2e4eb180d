use std::fmt;

/// A length-prefixed record `[n, a1, b1, .., an, bn]` of `2n + 1` cells.
///
/// The buffer is sized once for the largest record the producer can build and
/// reused for every candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    cells: Vec<i32>,
}

impl Record {
    pub fn with_max_pairs(max_pairs: usize) -> Record {
        let mut cells = Vec::with_capacity(2 * max_pairs + 1);
        cells.push(0);
        Record { cells }
    }

    /// The zero-length record: nothing left to remove.
    pub fn terminal() -> Record {
        Record::with_max_pairs(0)
    }

    pub fn from_pairs(pairs: &[(i32, i32)]) -> Record {
        let mut record = Record::with_max_pairs(pairs.len());
        for &(a, b) in pairs {
            record.push_pair(a, b);
        }
        record
    }

    pub fn clear(&mut self) {
        self.cells.truncate(1);
        self.cells[0] = 0;
    }

    pub fn push_pair(&mut self, a: i32, b: i32) {
        self.cells.push(a);
        self.cells.push(b);
        self.cells[0] += 1;
    }

    /// Number of pairs.
    pub fn size(&self) -> usize {
        self.cells[0] as usize
    }

    pub fn cells(&self) -> &[i32] {
        &self.cells
    }

    pub fn pairs(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.cells[1..].chunks_exact(2).map(|p| (p[0], p[1]))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (a, b) in self.pairs() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}-{}", a, b)?;
            first = false;
        }
        Ok(())
    }
}
