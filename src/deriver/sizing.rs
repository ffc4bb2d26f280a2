/// Inclusive `[min, max]` range of byte sizes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ByteRange {
    pub min: u64,
    pub max: u64,
}

impl ByteRange {
    pub fn new(min: u64, max: u64) -> Self {
        ByteRange { min, max }
    }

    /// Unlike `Ord::clamp`, this never panics. If `min > max` the min wins, but options
    /// validation rejects that shape before we ever get here.
    pub(crate) fn clamp(&self, value: u64) -> u64 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.min <= self.max
    }
}

/// Round up to the next multiple of `alignment`, unless already aligned.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    match value % alignment {
        0 => value,
        rem => value.saturating_add(alignment - rem),
    }
}

/// Round down to the previous multiple of `alignment`, unless already aligned.
pub(crate) fn align_down(value: u64, alignment: u64) -> u64 {
    value - value % alignment
}

pub(crate) fn is_aligned(value: u64, alignment: u64) -> bool {
    value % alignment == 0
}

/// `floor(total * pct / 100)` without overflowing on large memory limits.
pub(crate) fn percent_of(total: u64, pct: u64) -> u64 {
    let scaled = (total as u128) * (pct as u128) / 100;
    if scaled > u64::MAX as u128 {
        u64::MAX
    } else {
        scaled as u64
    }
}
