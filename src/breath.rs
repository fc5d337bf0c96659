//! Breath segmentation on zero crossings of the flow signal.
use itertools::Itertools;
use log::debug;

/// One breath, delimited by inspiration onsets.
///
/// Indices refer to the flow sample sequence the breath was segmented from.
#[derive(Debug, Clone, PartialEq)]
pub struct Breath {
    pub start: usize,
    pub end: usize,
    pub insp_start: usize,
    /// Exclusive; equal to `insp_start` while expiration has not been seen
    pub insp_end: usize,
    /// Seconds from the start of the recording
    pub start_time: f64,
    /// `None` when the recording ends before expiration starts
    pub end_time: Option<f64>,
}

impl Breath {
    /// Inspiratory samples of this breath.
    pub fn inspiration<'a>(&self, flow: &'a [f64]) -> &'a [f64] {
        &flow[self.insp_start..self.insp_end]
    }
}

/// Split a flow sequence into breaths.
///
/// A breath starts where the flow goes from `<= 0` to `> 0` and its
/// inspiration ends at the next `> 0` to `<= 0` transition. Nothing is
/// filtered here; scorers drop breaths that are too short for them.
pub fn segment_breaths(flow: &[f64], sampling_rate: f64) -> Vec<Breath> {
    let mut breaths: Vec<Breath> = Vec::new();
    let mut inspiring = false;

    for (i, (&prev, &cur)) in flow.iter().tuple_windows().enumerate() {
        let i = i + 1;
        if cur > 0.0 && prev <= 0.0 {
            inspiring = true;
            breaths.push(Breath {
                start: i,
                end: i,
                insp_start: i,
                insp_end: i,
                start_time: i as f64 / sampling_rate,
                end_time: None,
            });
        } else if cur <= 0.0 && prev > 0.0 {
            if inspiring {
                if let Some(breath) = breaths.last_mut() {
                    breath.insp_end = i;
                    breath.end = i;
                    breath.end_time = Some(i as f64 / sampling_rate);
                }
            }
            inspiring = false;
        }
    }
    debug!("Segmented {} breaths from {} samples", breaths.len(), flow.len());
    breaths
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_two_breaths() {
        let flow = [-1.0, 1.0, 2.0, 1.0, -1.0, -2.0, 0.0, 3.0, 0.0];
        let breaths = segment_breaths(&flow, 2.0);
        assert_eq!(
            breaths,
            vec![
                Breath {
                    start: 1,
                    end: 4,
                    insp_start: 1,
                    insp_end: 4,
                    start_time: 0.5,
                    end_time: Some(2.0),
                },
                Breath {
                    start: 7,
                    end: 8,
                    insp_start: 7,
                    insp_end: 8,
                    start_time: 3.5,
                    end_time: Some(4.0),
                },
            ]
        );
        assert_eq!(breaths[0].inspiration(&flow), &[1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_unfinished_breath() {
        let flow = [0.0, -1.0, 0.5, 0.7, 0.9];
        let breaths = segment_breaths(&flow, 1.0);
        assert_eq!(breaths.len(), 1);
        assert_eq!(breaths[0].end_time, None);
        assert!(breaths[0].inspiration(&flow).is_empty());
    }

    #[test]
    fn test_leading_positive_flow_is_not_a_breath() {
        // starts mid-inspiration, so the first downcrossing closes nothing
        let flow = [1.0, 1.0, -1.0, -1.0];
        assert!(segment_breaths(&flow, 1.0).is_empty());
    }

    #[test]
    fn test_no_transitions() {
        assert!(segment_breaths(&[], 25.0).is_empty());
        assert!(segment_breaths(&[0.3], 25.0).is_empty());
        assert!(segment_breaths(&[-1.0; 100], 25.0).is_empty());
    }
}
