use crate::{
    error::Error,
    pose::{Keypoint, KeypointKind, Keypoints, Point, NUM_KEYPOINTS},
};
use ndarray::ArrayViewD;

/// Values per joint row: y, x, confidence.
const ROW_LEN: usize = 3;

/// Decodes single-pose keypoint tensors.
#[derive(Debug, Copy, Clone, Default)]
pub struct Decoder;

impl Decoder {
    /// Validate that the output holds `NUM_KEYPOINTS` rows of `(y, x, score)`.
    ///
    /// Leading dimensions must all be 1, so `[1, 1, K, 3]`, `[1, K, 3]` and
    /// `[K, 3]` are accepted.
    pub fn validate_output_shape(&self, shape: &[usize]) -> Result<(), Error> {
        let valid = match shape {
            [leading @ .., rows, ROW_LEN] => {
                *rows == NUM_KEYPOINTS && leading.iter().all(|&d| d == 1)
            }
            _ => false,
        };
        if valid {
            Ok(())
        } else {
            Err(Error::UnexpectedOutputShape {
                expected: NUM_KEYPOINTS,
                shape: shape.to_vec(),
            })
        }
    }

    /// Label every row. Nothing is filtered: low scores are kept as they are.
    pub fn decode(&self, output: ArrayViewD<'_, f32>) -> Result<Keypoints, Error> {
        self.validate_output_shape(output.shape())?;
        let rows = output
            .into_shape((NUM_KEYPOINTS, ROW_LEN))
            .map_err(Error::ReshapeOutput)?;

        Ok(std::array::from_fn(|i| Keypoint {
            kind: KeypointKind::ALL[i],
            point: Point::new(rows[(i, 1)], rows[(i, 0)]),
            score: rows[(i, 2)],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn output(shape: &[usize]) -> Array<f32, IxDyn> {
        let len = shape.iter().product();
        Array::from_shape_vec(IxDyn(shape), (0..len).map(|v| v as f32 / 100.0).collect()).unwrap()
    }

    #[test]
    fn swaps_y_x_and_keeps_every_row() {
        let raw = output(&[1, 1, NUM_KEYPOINTS, 3]);
        let keypoints = Decoder.decode(raw.view()).unwrap();
        assert_eq!(keypoints.len(), NUM_KEYPOINTS);
        for (i, keypoint) in keypoints.iter().enumerate() {
            let base = (i * 3) as f32 / 100.0;
            assert_eq!(keypoint.index(), i);
            assert_eq!(keypoint.point.y, base);
            assert_eq!(keypoint.point.x, (i * 3 + 1) as f32 / 100.0);
            assert_eq!(keypoint.score, (i * 3 + 2) as f32 / 100.0);
        }
        assert_eq!(keypoints[5].name(), "left_shoulder");
    }

    #[test]
    fn zero_scores_are_not_filtered() {
        let raw = Array::<f32, _>::zeros(IxDyn(&[NUM_KEYPOINTS, 3]));
        let keypoints = Decoder.decode(raw.view()).unwrap();
        assert!(keypoints.iter().all(|k| k.score == 0.0));
        assert_eq!(keypoints.len(), NUM_KEYPOINTS);
    }

    #[test]
    fn accepts_squeezed_layouts() {
        assert!(Decoder.decode(output(&[1, NUM_KEYPOINTS, 3]).view()).is_ok());
        assert!(Decoder.decode(output(&[NUM_KEYPOINTS, 3]).view()).is_ok());
    }

    #[test]
    fn rejects_other_shapes() {
        for shape in [vec![1, 6, 56], vec![1, 1, 16, 3], vec![2, NUM_KEYPOINTS, 3], vec![51]].iter() {
            assert!(matches!(
                Decoder.decode(output(shape).view()),
                Err(Error::UnexpectedOutputShape { .. })
            ));
        }
    }
}
