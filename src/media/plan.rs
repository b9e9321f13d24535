//! How a media file of a given duration is cut into chunks.

/// One chunk of a media file, in seconds of the parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

/// Whether audio is extracted whole or split at fixed points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    Extract,
    Split,
}

/// Chunk layout of one media file.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    pub mode: PlanMode,
    pub duration: f64,
    pub chunks: Vec<Chunk>,
}

impl ChunkPlan {
    /// Media up to `threshold` seconds becomes one extracted chunk. Longer
    /// media gets one chunk per whole `threshold`, plus one for the remainder
    /// when it exceeds `min_remainder`. A dropped remainder stays in the last
    /// chunk, since the splitter only cuts at the chunk starts.
    pub fn new(duration: f64, threshold: f64, min_remainder: f64) -> Self {
        let duration = duration.max(0.0);
        if duration <= threshold {
            return Self {
                mode: PlanMode::Extract,
                duration,
                chunks: vec![Chunk {
                    index: 0,
                    start: 0.0,
                    end: duration,
                }],
            };
        }

        let whole = (duration / threshold).floor() as usize;
        let remainder = duration - whole as f64 * threshold;
        let count = whole + usize::from(remainder > min_remainder);
        let chunks = (0..count)
            .map(|index| Chunk {
                index,
                start: index as f64 * threshold,
                end: if index + 1 == count {
                    duration
                } else {
                    (index + 1) as f64 * threshold
                },
            })
            .collect();

        Self {
            mode: PlanMode::Split,
            duration,
            chunks,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Cut points handed to the splitter: every chunk start but the first.
    pub fn split_points(&self) -> Vec<f64> {
        self.chunks.iter().skip(1).map(|c| c.start).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_media_is_extracted_whole() {
        let plan = ChunkPlan::new(42.5, 600.0, 0.1);
        assert_eq!(plan.mode, PlanMode::Extract);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.chunks[0].end, 42.5);
        assert!(plan.split_points().is_empty());
    }

    #[test]
    fn test_duration_equal_to_threshold_is_one_chunk() {
        let plan = ChunkPlan::new(600.0, 600.0, 0.1);
        assert_eq!(plan.mode, PlanMode::Extract);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_remainder_becomes_its_own_chunk() {
        let plan = ChunkPlan::new(150.0, 60.0, 0.1);
        assert_eq!(plan.mode, PlanMode::Split);
        let bounds: Vec<(usize, f64, f64)> =
            plan.chunks.iter().map(|c| (c.index, c.start, c.end)).collect();
        assert_eq!(bounds, vec![(0, 0.0, 60.0), (1, 60.0, 120.0), (2, 120.0, 150.0)]);
        assert_eq!(plan.split_points(), vec![60.0, 120.0]);
    }

    #[test]
    fn test_tiny_remainder_is_folded_into_last_chunk() {
        let plan = ChunkPlan::new(120.05, 60.0, 0.1);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.chunks[1].end, 120.05);
        assert_eq!(plan.split_points(), vec![60.0]);
    }

    #[test]
    fn test_barely_over_threshold_still_splits() {
        let plan = ChunkPlan::new(600.05, 600.0, 0.1);
        assert_eq!(plan.mode, PlanMode::Split);
        assert_eq!(plan.len(), 1);
        assert!(plan.split_points().is_empty());
    }

    #[test]
    fn test_chunk_count_formula() {
        for (duration, expected) in [(600.2, 2), (1200.0, 2), (1800.5, 4), (3599.0, 6)] {
            assert_eq!(ChunkPlan::new(duration, 600.0, 0.1).len(), expected, "D = {}", duration);
        }
    }
}
