//! Range-aware chunk assembly: fetches are aligned to chunk boundaries and
//! the first/last parts are trimmed so the concatenated output is exactly
//! the requested byte window.

use super::error::StreamError;
use bytes::Bytes;

/// The fetch schedule for one byte window `[start, end]` (inclusive) over a
/// file, given a chunk size.
///
/// `offset` is `start` aligned down to a chunk boundary; `first_part_cut`
/// bytes are dropped from the head of the first chunk and only
/// `last_part_cut` bytes of the final chunk are kept. `part_count` chunk
/// fetches cover the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub offset: u64,
    pub first_part_cut: usize,
    pub last_part_cut: usize,
    pub part_count: u64,
    pub chunk_size: u64,
}

impl ChunkPlan {
    pub fn compute(start: u64, end: u64, chunk_size: u64) -> ChunkPlan {
        let offset = start - (start % chunk_size);
        ChunkPlan {
            offset,
            first_part_cut: (start - offset) as usize,
            last_part_cut: ((end % chunk_size) + 1) as usize,
            part_count: ((end - offset) / chunk_size) + 1,
            chunk_size,
        }
    }

    /// Validate the window against the file size before planning any fetch.
    pub fn for_window(
        start: u64,
        end: u64,
        total_size: u64,
        chunk_size: u64,
    ) -> Result<ChunkPlan, StreamError> {
        if start > end || end >= total_size {
            return Err(StreamError::InvalidRange {
                start,
                end,
                size: total_size,
            });
        }
        Ok(ChunkPlan::compute(start, end, chunk_size))
    }

    /// Trim one fetched chunk according to its position in the plan.
    /// `part` is 1-based. Cuts are clamped so a short final chunk (end of
    /// file inside the window) never panics.
    pub fn slice_part(&self, part: u64, chunk: Bytes) -> Bytes {
        let len = chunk.len();
        if self.part_count == 1 {
            let head = self.first_part_cut.min(len);
            let tail = self.last_part_cut.clamp(head, len);
            chunk.slice(head..tail)
        } else if part == 1 {
            chunk.slice(self.first_part_cut.min(len)..)
        } else if part == self.part_count {
            chunk.slice(..self.last_part_cut.min(len))
        } else {
            chunk
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: u64 = 512 * 1024;

    #[test]
    fn plan_follows_the_alignment_formulas() {
        let (start, end) = (600_000u64, 700_000u64);
        let plan = ChunkPlan::for_window(start, end, 1_000_000, CHUNK).unwrap();

        assert_eq!(plan.offset, start - (start % CHUNK));
        assert_eq!(plan.first_part_cut as u64, start - plan.offset);
        assert_eq!(plan.last_part_cut as u64, (end % CHUNK) + 1);
        assert_eq!(plan.part_count, (end - plan.offset) / CHUNK + 1);
    }

    #[test]
    fn single_aligned_chunk_covers_the_whole_file() {
        let total = 4096u64;
        let plan = ChunkPlan::for_window(0, total - 1, total, total).unwrap();
        assert_eq!(plan.part_count, 1);
        assert_eq!(plan.offset, 0);
        assert_eq!(plan.first_part_cut, 0);
        assert_eq!(plan.last_part_cut as u64, total);
    }

    #[test]
    fn windows_outside_the_file_are_rejected() {
        assert!(matches!(
            ChunkPlan::for_window(10, 5, 100, CHUNK),
            Err(StreamError::InvalidRange { .. })
        ));
        assert!(matches!(
            ChunkPlan::for_window(0, 100, 100, CHUNK),
            Err(StreamError::InvalidRange { .. })
        ));
        assert!(ChunkPlan::for_window(0, 99, 100, CHUNK).is_ok());
    }

    #[test]
    fn trimming_reproduces_the_exact_window() {
        // file of 100 bytes, window 13..=87, chunks of 32
        let file: Vec<u8> = (0..100u8).collect();
        let (start, end) = (13u64, 87u64);
        let plan = ChunkPlan::for_window(start, end, file.len() as u64, 32).unwrap();

        let mut out = Vec::new();
        let mut offset = plan.offset;
        for part in 1..=plan.part_count {
            let chunk_end = ((offset + plan.chunk_size) as usize).min(file.len());
            let chunk = Bytes::copy_from_slice(&file[offset as usize..chunk_end]);
            out.extend_from_slice(&plan.slice_part(part, chunk));
            offset += plan.chunk_size;
        }

        assert_eq!(out, &file[start as usize..=end as usize]);
    }

    #[test]
    fn varying_chunk_size_does_not_change_the_bytes() {
        let file: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let (start, end) = (700u64, 4321u64);
        let mut reference = None;

        for chunk_size in [64u64, 256, 1024, 4096, 8192] {
            let plan = ChunkPlan::for_window(start, end, file.len() as u64, chunk_size).unwrap();
            let mut out = Vec::new();
            let mut offset = plan.offset;
            for part in 1..=plan.part_count {
                if offset as usize >= file.len() {
                    break;
                }
                let chunk_end = ((offset + plan.chunk_size) as usize).min(file.len());
                let chunk = Bytes::copy_from_slice(&file[offset as usize..chunk_end]);
                out.extend_from_slice(&plan.slice_part(part, chunk));
                offset += plan.chunk_size;
            }
            assert_eq!(out, &file[start as usize..=end as usize]);
            match &reference {
                None => reference = Some(out),
                Some(prev) => assert_eq!(prev, &out),
            }
        }
    }
}
