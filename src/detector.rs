use std::path::{Path, PathBuf};

use opencv::{
    core::{self, Mat, Point, Ptr, Scalar, Size, Vector},
    dnn, imgproc,
    prelude::*,
    video,
};

use crate::{Detection, Error};

/// Contours smaller than this many pixels are treated as sensor noise.
const MIN_BLOB_AREA: f64 = 500.0;
const MORPH_KERNEL_SIZE: i32 = 5;

/// Per-frame object proposal source.
///
/// `detect` takes `&mut self` because the motion variant keeps a running
/// background model across calls; the neural variant is stateless per call.
pub trait DetectionBackend {
    fn detect(&mut self, frame: &Mat) -> opencv::Result<Vec<Detection>>;
}

#[derive(Debug, Clone)]
pub enum BackendKind {
    Neural { model_path: PathBuf },
    Motion,
}

/// Construction-time backend selection; never changes mid-job.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub confidence: f32,
}

impl BackendConfig {
    pub fn neural(model_path: impl Into<PathBuf>, confidence: f32) -> Self {
        Self {
            kind: BackendKind::Neural {
                model_path: model_path.into(),
            },
            confidence,
        }
    }

    pub fn motion() -> Self {
        Self {
            kind: BackendKind::Motion,
            confidence: 1.0,
        }
    }

    pub fn build(&self) -> Result<Box<dyn DetectionBackend>, Error> {
        Ok(match &self.kind {
            BackendKind::Neural { model_path } => {
                Box::new(NeuralDetector::new(model_path, self.confidence)?)
            }
            BackendKind::Motion => Box::new(MotionDetector::new()?),
        })
    }
}

pub struct NeuralDetectorConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: i32,
}

impl NeuralDetectorConfig {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
            iou_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// ONNX detector run through the OpenCV dnn module.
///
/// Decodes `[cx cy w h class-scores..]` prediction rows, keeps the best
/// class score above the configured threshold and applies confidence-sorted
/// IoU suppression.
pub struct NeuralDetector {
    net: dnn::Net,
    config: NeuralDetectorConfig,
}

impl NeuralDetector {
    pub fn new(model_path: &Path, confidence: f32) -> Result<Self, Error> {
        Self::with_config(model_path, NeuralDetectorConfig::new(confidence))
    }

    pub fn with_config(model_path: &Path, config: NeuralDetectorConfig) -> Result<Self, Error> {
        log::info!("loading detection model from {}", model_path.display());
        let net = dnn::read_net_from_onnx(&model_path.to_string_lossy())?;

        Ok(Self { net, config })
    }

    fn postprocess(&self, out: &Mat, fw: f32, fh: f32) -> opencv::Result<Vec<Detection>> {
        let size = out.mat_size();
        let dims: &[i32] = &size;
        let (npreds, pred_size) = match *dims {
            [_, npreds, pred_size] => (npreds as usize, pred_size as usize),
            _ => return Ok(vec![]),
        };

        if pred_size < 5 {
            return Ok(vec![]);
        }

        let data = out.data_typed::<f32>()?;
        let mut detections = Vec::new();

        for index in 0..npreds {
            let row = &data[index * pred_size..(index + 1) * pred_size];

            let (x, y, w, h) = match &row[0..4] {
                [center_x, center_y, width, height] => (
                    center_x * fw,
                    center_y * fh,
                    width * fw,
                    height * fh,
                ),
                _ => unreachable!(),
            };

            let mut confidence = 0.0;
            for val in row[4..].iter().copied() {
                if val > confidence {
                    confidence = val;
                }
            }

            if confidence <= self.config.confidence_threshold {
                continue;
            }

            // Boxes covering more than a quarter of the frame are junk.
            if w * h > (fw / 2.0) * (fh / 2.0) {
                continue;
            }

            detections.push(Detection::new(x, y, w, h, confidence));
        }

        non_maximum_suppression(&mut detections, self.config.iou_threshold);

        Ok(detections)
    }
}

fn non_maximum_suppression(dets: &mut Vec<Detection>, iou_threshold: f32) {
    if dets.len() < 2 {
        return;
    }

    dets.sort_unstable_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

    let mut retain = vec![true; dets.len()];
    for idx in 0..dets.len() - 1 {
        if !retain[idx] {
            continue;
        }

        for r in idx + 1..dets.len() {
            if retain[r] && dets[idx].iou(&dets[r]) > iou_threshold {
                retain[r] = false;
            }
        }
    }

    let mut keep = retain.iter();
    dets.retain(|_| *keep.next().unwrap_or(&false));
}

impl DetectionBackend for NeuralDetector {
    fn detect(&mut self, frame: &Mat) -> opencv::Result<Vec<Detection>> {
        let input_size = self.config.input_size;
        let blob = dnn::blob_from_image(
            frame,
            1.0 / 255.0,
            Size::new(input_size, input_size),
            Scalar::default(),
            true,
            false,
            core::CV_32F,
        )?;

        self.net.set_input(&blob, "", 1.0, Scalar::default())?;

        let names = self.net.get_unconnected_out_layers_names()?;
        let mut outputs: Vector<Mat> = Vector::new();
        self.net.forward(&mut outputs, &names)?;

        let out = match outputs.iter().next() {
            Some(out) => out,
            None => return Ok(vec![]),
        };

        self.postprocess(&out, frame.cols() as f32, frame.rows() as f32)
    }
}

/// Fallback detector: MOG2 background subtraction with morphological
/// close+open noise reduction, keeping foreground blobs above `MIN_BLOB_AREA`
/// at fixed confidence 1.0. The background model persists for the whole job.
pub struct MotionDetector {
    subtractor: Ptr<dyn video::BackgroundSubtractorMOG2>,
    kernel: Mat,
}

impl MotionDetector {
    pub fn new() -> Result<Self, Error> {
        log::info!("using background subtraction method");
        let subtractor = video::create_background_subtractor_mog2(500, 16.0, true)?;
        let kernel = imgproc::get_structuring_element(
            imgproc::MORPH_RECT,
            Size::new(MORPH_KERNEL_SIZE, MORPH_KERNEL_SIZE),
            Point::new(-1, -1),
        )?;

        Ok(Self { subtractor, kernel })
    }
}

impl DetectionBackend for MotionDetector {
    fn detect(&mut self, frame: &Mat) -> opencv::Result<Vec<Detection>> {
        let mut fg_mask = Mat::default();
        opencv::prelude::BackgroundSubtractorMOG2::apply(&mut self.subtractor, frame, &mut fg_mask, -1.0)?;

        let mut closed = Mat::default();
        imgproc::morphology_ex(
            &fg_mask,
            &mut closed,
            imgproc::MORPH_CLOSE,
            &self.kernel,
            Point::new(-1, -1),
            1,
            core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;

        let mut opened = Mat::default();
        imgproc::morphology_ex(
            &closed,
            &mut opened,
            imgproc::MORPH_OPEN,
            &self.kernel,
            Point::new(-1, -1),
            1,
            core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;

        let mut contours: Vector<Vector<Point>> = Vector::new();
        imgproc::find_contours(
            &opened,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut detections = Vec::new();
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if area > MIN_BLOB_AREA {
                let rect = imgproc::bounding_rect(&contour)?;
                detections.push(Detection::from_ltwh(
                    rect.x as f32,
                    rect.y as f32,
                    rect.width as f32,
                    rect.height as f32,
                    1.0,
                ));
            }
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Rect, CV_8UC3};

    fn black_frame() -> Mat {
        Mat::new_rows_cols_with_default(240, 320, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    fn frame_with_square(rect: Rect) -> Mat {
        let mut frame = black_frame();
        imgproc::rectangle(
            &mut frame,
            rect,
            Scalar::new(255.0, 255.0, 255.0, 0.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
        frame
    }

    #[test]
    fn motion_detector_finds_a_new_bright_blob() {
        let mut detector = MotionDetector::new().unwrap();

        for _ in 0..5 {
            detector.detect(&black_frame()).unwrap();
        }

        let square = Rect::new(100, 80, 80, 80);
        let detections = detector.detect(&frame_with_square(square)).unwrap();

        assert!(!detections.is_empty());
        let det = detections
            .iter()
            .max_by(|a, b| (a.w * a.h).partial_cmp(&(b.w * b.h)).unwrap())
            .unwrap();
        assert!((det.x - 140.0).abs() < 20.0);
        assert!((det.y - 120.0).abs() < 20.0);
        assert_eq!(det.confidence, 1.0);
    }

    #[test]
    fn motion_detector_ignores_tiny_blobs() {
        let mut detector = MotionDetector::new().unwrap();

        for _ in 0..5 {
            detector.detect(&black_frame()).unwrap();
        }

        // 10x10 = 100 px, well under the 500 px area floor.
        let dot = Rect::new(100, 80, 10, 10);
        let detections = detector.detect(&frame_with_square(dot)).unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn nms_drops_overlapping_lower_confidence_boxes() {
        let mut dets = vec![
            Detection::new(100.0, 100.0, 40.0, 40.0, 0.6),
            Detection::new(102.0, 101.0, 40.0, 40.0, 0.9),
            Detection::new(300.0, 300.0, 40.0, 40.0, 0.7),
        ];

        non_maximum_suppression(&mut dets, 0.45);

        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].confidence, 0.9);
        assert_eq!(dets[1].confidence, 0.7);
    }

    #[test]
    fn nms_keeps_disjoint_boxes() {
        let mut dets = vec![
            Detection::new(50.0, 50.0, 20.0, 20.0, 0.6),
            Detection::new(200.0, 200.0, 20.0, 20.0, 0.8),
        ];

        non_maximum_suppression(&mut dets, 0.45);
        assert_eq!(dets.len(), 2);
    }
}
