/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 *
 * (c)2024 Cedar Project Contributors
 */

//! Sequence-id classification. Grounded on
//! `original_source/libcedar/bundle/utils.go`'s `inRange`/`seqCheck`: ids
//! are 32-bit and wrap, so comparisons use wrapping arithmetic rather than
//! plain `<`/`>`.

use crate::constants::DUPLICATE_LOOKBACK;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqStatus {
    /// Inside the open send window `[expected, expected + buffer_len)`.
    InRange,
    /// Behind the expected id but within the duplicate lookback window —
    /// already delivered, should only be re-acknowledged.
    Received,
    /// Too far behind or ahead to classify; treat as suspect.
    OutOfRange,
}

/// True if `seq` lies in the half-open wrapping interval `[start, end)`.
pub fn in_range(seq: u32, start: u32, end: u32) -> bool {
    seq.wrapping_sub(start) < end.wrapping_sub(start)
}

/// Classify `seq` relative to the next-expected id `expected`, given the
/// current send-window size `buffer_len`.
pub fn seq_check(seq: u32, expected: u32, buffer_len: u32) -> SeqStatus {
    if in_range(seq, expected, expected.wrapping_add(buffer_len)) {
        return SeqStatus::InRange;
    }
    if in_range(seq, expected.wrapping_sub(DUPLICATE_LOOKBACK), expected) {
        return SeqStatus::Received;
    }
    SeqStatus::OutOfRange
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_in_range() {
        assert_eq!(seq_check(10, 10, 100), SeqStatus::InRange);
    }

    #[test]
    fn ahead_within_window_is_in_range() {
        assert_eq!(seq_check(11, 10, 100), SeqStatus::InRange);
        assert_eq!(seq_check(109, 10, 100), SeqStatus::InRange);
    }

    #[test]
    fn ahead_beyond_window_is_out_of_range() {
        assert_eq!(seq_check(110, 10, 100), SeqStatus::OutOfRange);
    }

    #[test]
    fn recently_seen_id_is_received() {
        assert_eq!(seq_check(9, 10, 100), SeqStatus::Received);
        assert_eq!(seq_check(10 - 50_000, 10, 100), SeqStatus::Received);
    }

    #[test]
    fn far_behind_id_is_out_of_range() {
        assert_eq!(seq_check(10u32.wrapping_sub(200_000), 10, 100), SeqStatus::OutOfRange);
    }

    #[test]
    fn zero_buffer_len_yields_an_empty_window() {
        // [expected, expected) is empty, so even the expected id itself
        // falls through to out-of-range rather than in-range.
        assert_eq!(seq_check(10, 10, 0), SeqStatus::OutOfRange);
        assert_eq!(seq_check(11, 10, 0), SeqStatus::OutOfRange);
    }

    #[test]
    fn wraps_around_u32_boundary() {
        let expected = 5u32;
        let seq = u32::MAX - 2;
        assert_eq!(seq_check(seq, expected, 100), SeqStatus::Received);
    }
}
