use log::debug;
use ort::Session;

use crate::ml::{
    error::{MlError, MlResult},
    face::detector::{FaceDetector, RawBox, ensure_detectable, normalize_box, retain_confident},
    onnx::{self, TensorOutput},
    preprocess::{self, YOLO_INPUT_HEIGHT, YOLO_INPUT_WIDTH},
    runtime::ExecutionProviderPolicy,
    types::{DecodedImage, Detection, Dimensions},
};

const INPUT_WIDTH: f32 = YOLO_INPUT_WIDTH as f32;
const INPUT_HEIGHT: f32 = YOLO_INPUT_HEIGHT as f32;
const IOU_THRESHOLD: f32 = 0.4;
/// cx, cy, w, h, score, then five (x, y) keypoints.
const ROW_LEN: usize = 16;

/// Neural face detector over a YOLO-face ONNX model.
#[derive(Debug)]
pub struct YoloFaceDetector {
    session: Session,
}

impl YoloFaceDetector {
    pub fn load(model_path: &str, policy: &ExecutionProviderPolicy) -> MlResult<Self> {
        let session = onnx::build_session(model_path, policy)?;
        Ok(Self { session })
    }
}

impl FaceDetector for YoloFaceDetector {
    fn name(&self) -> &'static str {
        "yolo-face"
    }

    fn detect(&self, image: &DecodedImage, min_confidence: f32) -> MlResult<Vec<Detection>> {
        ensure_detectable(image)?;
        let input = preprocess::preprocess_yolo(image)?;
        let output = onnx::run_f32(
            &self.session,
            input.tensor,
            [1, 3, YOLO_INPUT_HEIGHT as i64, YOLO_INPUT_WIDTH as i64],
        )?;

        let raw_boxes = decode_rows(
            &output,
            min_confidence,
            input.scaled_width,
            input.scaled_height,
        )?;
        let mut detections = to_pixel_detections(raw_boxes, image.dimensions);
        retain_confident(&mut detections, min_confidence);
        debug!(
            "yolo-face kept {} detection(s) at min_confidence={min_confidence}",
            detections.len()
        );
        Ok(detections)
    }
}

/// How detection rows sit in the model output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RowLayout {
    /// `[1, N, 16]` or `[N, 16]`: one contiguous row per candidate.
    RowMajor { rows: usize },
    /// `[1, 16, N]` or `[16, N]`: one contiguous run per field.
    Transposed { rows: usize },
}

impl RowLayout {
    fn of(shape: &[usize]) -> MlResult<Self> {
        let dims = match shape {
            [1, a, b] | [a, b] => (*a, *b),
            _ => return Err(unsupported_shape(shape)),
        };
        match dims {
            (rows, ROW_LEN) => Ok(RowLayout::RowMajor { rows }),
            (ROW_LEN, rows) => Ok(RowLayout::Transposed { rows }),
            _ => Err(unsupported_shape(shape)),
        }
    }

    fn rows(self) -> usize {
        match self {
            RowLayout::RowMajor { rows } | RowLayout::Transposed { rows } => rows,
        }
    }

    fn field(self, data: &[f32], row: usize, field: usize) -> f32 {
        match self {
            RowLayout::RowMajor { .. } => data[row * ROW_LEN + field],
            RowLayout::Transposed { rows } => data[field * rows + row],
        }
    }
}

fn unsupported_shape(shape: &[usize]) -> MlError {
    MlError::DetectionUnavailable(format!(
        "unsupported face detector output shape {shape:?}, expected [1, N, {ROW_LEN}] or [1, {ROW_LEN}, N]"
    ))
}

/// Parses model rows into boxes relative to the original image.
fn decode_rows(
    output: &TensorOutput,
    min_confidence: f32,
    scaled_width: usize,
    scaled_height: usize,
) -> MlResult<Vec<(RawBox, f32)>> {
    let layout = RowLayout::of(&output.shape)?;
    let rows = layout.rows();
    if output.data.len() != rows * ROW_LEN {
        return Err(MlError::DetectionUnavailable(format!(
            "face detector output holds {} values, shape {:?} needs {}",
            output.data.len(),
            output.shape,
            rows * ROW_LEN
        )));
    }

    // The letterboxed image only fills the top-left `scaled` part of the input.
    let scale_x = INPUT_WIDTH / scaled_width as f32;
    let scale_y = INPUT_HEIGHT / scaled_height as f32;

    let mut boxes = Vec::new();
    for row in 0..rows {
        let [cx, cy, w, h, score] =
            [0, 1, 2, 3, 4].map(|field| layout.field(&output.data, row, field));
        if score < min_confidence {
            continue;
        }

        boxes.push((
            RawBox::Relative {
                x: (cx - w / 2.0) / INPUT_WIDTH * scale_x,
                y: (cy - h / 2.0) / INPUT_HEIGHT * scale_y,
                width: w / INPUT_WIDTH * scale_x,
                height: h / INPUT_HEIGHT * scale_y,
            },
            score,
        ));
    }
    Ok(boxes)
}

fn to_pixel_detections(raw_boxes: Vec<(RawBox, f32)>, dimensions: Dimensions) -> Vec<Detection> {
    let detections = raw_boxes
        .into_iter()
        .filter_map(|(raw, score)| {
            normalize_box(raw, dimensions).map(|rect| Detection {
                rect,
                confidence: score,
            })
        })
        .collect();
    naive_non_max_suppression(detections, IOU_THRESHOLD)
}

fn naive_non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut i = 0usize;
    while i + 1 < detections.len() {
        let mut j = i + 1;
        while j < detections.len() {
            if detections[i].rect.iou(&detections[j].rect) >= iou_threshold {
                detections.remove(j);
            } else {
                j += 1;
            }
        }
        i += 1;
    }
    detections
}

#[cfg(test)]
mod tests {
    use super::{ROW_LEN, decode_rows, naive_non_max_suppression, to_pixel_detections};
    use crate::ml::{
        error::MlError,
        face::detector::RawBox,
        onnx::TensorOutput,
        types::{Detection, Dimensions, Rect},
    };

    fn row(cx: f32, cy: f32, w: f32, h: f32, score: f32) -> Vec<f32> {
        let mut row = vec![0.0; ROW_LEN];
        row[..5].copy_from_slice(&[cx, cy, w, h, score]);
        row
    }

    fn row_major(rows: &[Vec<f32>]) -> TensorOutput {
        TensorOutput {
            shape: vec![1, rows.len(), ROW_LEN],
            data: rows.concat(),
        }
    }

    fn transposed(rows: &[Vec<f32>]) -> TensorOutput {
        let data = (0..ROW_LEN)
            .flat_map(|field| rows.iter().map(move |row| row[field]))
            .collect();
        TensorOutput {
            shape: vec![1, ROW_LEN, rows.len()],
            data,
        }
    }

    fn assert_relative(raw: RawBox, expected: [f32; 4]) {
        match raw {
            RawBox::Relative {
                x,
                y,
                width,
                height,
            } => {
                for (got, want) in [x, y, width, height].into_iter().zip(expected) {
                    assert!((got - want).abs() < 1e-6, "{raw:?} vs {expected:?}");
                }
            }
            other => panic!("expected relative box, got {other:?}"),
        }
    }

    #[test]
    fn decode_rows_drops_low_scores_and_undoes_letterbox() {
        let output = row_major(&[
            row(160.0, 80.0, 64.0, 32.0, 0.9),
            row(10.0, 10.0, 4.0, 4.0, 0.2),
        ]);

        // 1280x640 source letterboxed into 640x320
        let boxes = decode_rows(&output, 0.5, 640, 320).expect("rows should decode");

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].1, 0.9);
        assert_relative(boxes[0].0, [0.2, 0.2, 0.1, 0.1]);
    }

    #[test]
    fn decode_rows_reads_field_major_output() {
        let rows = [
            row(320.0, 320.0, 128.0, 64.0, 0.8),
            row(10.0, 10.0, 4.0, 4.0, 0.1),
            row(64.0, 128.0, 64.0, 64.0, 0.95),
        ];

        let boxes = decode_rows(&transposed(&rows), 0.5, 640, 640).expect("rows should decode");
        let expected = decode_rows(&row_major(&rows), 0.5, 640, 640).expect("rows should decode");

        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes, expected);
        assert_eq!(boxes[1].1, 0.95);
        assert_relative(boxes[0].0, [0.4, 0.45, 0.2, 0.1]);
    }

    #[test]
    fn decode_rows_accepts_unbatched_rows() {
        let output = TensorOutput {
            shape: vec![1, ROW_LEN],
            data: row(320.0, 320.0, 64.0, 64.0, 0.7),
        };

        let boxes = decode_rows(&output, 0.5, 640, 640).expect("rows should decode");

        assert_eq!(boxes.len(), 1);
        assert_relative(boxes[0].0, [0.45, 0.45, 0.1, 0.1]);
    }

    #[test]
    fn decode_rows_rejects_unsupported_shape() {
        for shape in [vec![1, 5, 7], vec![2, 3, ROW_LEN], vec![ROW_LEN], vec![1, 1, 3, ROW_LEN]] {
            let output = TensorOutput {
                data: vec![0.0; shape.iter().product()],
                shape,
            };
            assert!(matches!(
                decode_rows(&output, 0.5, 640, 640),
                Err(MlError::DetectionUnavailable(_))
            ));
        }
    }

    #[test]
    fn decode_rows_rejects_truncated_output() {
        let output = TensorOutput {
            shape: vec![1, 2, ROW_LEN],
            data: vec![0.0; ROW_LEN + 4],
        };
        assert!(matches!(
            decode_rows(&output, 0.5, 640, 640),
            Err(MlError::DetectionUnavailable(_))
        ));
    }

    #[test]
    fn pixel_detections_are_clamped_and_deduplicated() {
        let dims = Dimensions {
            width: 200,
            height: 100,
        };
        let raw = vec![
            (
                RawBox::Relative {
                    x: -0.1,
                    y: 0.1,
                    width: 0.5,
                    height: 0.5,
                },
                0.8,
            ),
            (
                RawBox::Relative {
                    x: -0.1,
                    y: 0.1,
                    width: 0.5,
                    height: 0.52,
                },
                0.7,
            ),
        ];

        let detections = to_pixel_detections(raw, dims);

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].rect, Rect::new(0, 10, 80, 50));
        assert_eq!(detections[0].confidence, 0.8);
    }

    #[test]
    fn nms_keeps_separate_faces() {
        let detections = vec![
            Detection {
                rect: Rect::new(0, 0, 10, 10),
                confidence: 0.6,
            },
            Detection {
                rect: Rect::new(50, 50, 10, 10),
                confidence: 0.9,
            },
        ];

        let kept = naive_non_max_suppression(detections, 0.4);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
    }
}
