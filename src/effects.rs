use std::collections::HashSet;

use opencv::{
    core::{self, Mat, Point, Rect, Scalar},
    imgproc,
    prelude::*,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::TrackedObject;

pub const DEFAULT_CONNECTION_PROBABILITY: f32 = 0.3;

/// Pairs further apart than this are never connected.
const CONNECTION_DISTANCE: f32 = 200.0;
const DASH_LENGTH: i32 = 10;

#[inline]
fn white() -> Scalar {
    Scalar::new(255.0, 255.0, 255.0, 0.0)
}

/// Draws the relational overlay for one frame, in place.
///
/// Four passes, in order: probabilistic connection selection over all object
/// pairs, color inversion inside the bboxes of marked objects, rectangle +
/// id annotation, dashed connection lines. All randomness is drawn fresh
/// every frame from the injected generator; with the default entropy-seeded
/// generator output is not reproducible run-to-run.
pub struct EffectsRenderer<R = StdRng> {
    rng: R,
    connection_probability: f32,
}

impl EffectsRenderer<StdRng> {
    pub fn new(connection_probability: f32) -> Self {
        Self::with_rng(connection_probability, StdRng::from_entropy())
    }
}

impl Default for EffectsRenderer<StdRng> {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_PROBABILITY)
    }
}

impl<R: Rng> EffectsRenderer<R> {
    /// Pins the random source, e.g. for golden-frame tests.
    pub fn with_rng(connection_probability: f32, rng: R) -> Self {
        Self {
            rng,
            connection_probability,
        }
    }

    pub fn render(&mut self, frame: &mut Mat, objects: &[TrackedObject]) -> opencv::Result<()> {
        if objects.is_empty() {
            return Ok(());
        }

        let cols = frame.cols();
        let rows = frame.rows();
        let font_scale = (rows as f64 / 1000.0).clamp(0.4, 0.8);

        // Pass 1: pick connections and which objects get inverted.
        let mut connections: Vec<(Point, Point)> = Vec::new();
        let mut inverted: HashSet<u32> = HashSet::new();

        for i in 0..objects.len() {
            for j in i + 1..objects.len() {
                if self.rng.gen::<f32>() >= self.connection_probability {
                    continue;
                }

                let a = &objects[i].detection;
                let b = &objects[j].detection;

                if a.distance_to(b) < CONNECTION_DISTANCE {
                    connections.push((
                        Point::new(a.x as i32, a.y as i32),
                        Point::new(b.x as i32, b.y as i32),
                    ));

                    if self.rng.gen::<f32>() < 0.5 {
                        inverted.insert(objects[i].id);
                        inverted.insert(objects[j].id);
                    }
                }
            }
        }

        // Pass 2: invert pixel values inside marked bboxes.
        for obj in objects {
            if inverted.contains(&obj.id) {
                invert_region(frame, obj.detection.rect())?;
            }
        }

        // Pass 3: rectangles and id labels.
        for obj in objects {
            let rect = obj.detection.rect();

            imgproc::rectangle(frame, rect, white(), 1, imgproc::LINE_8, 0)?;

            let label_x = rect.x + rect.width + 5;
            let label_y = rect.y + 15;

            if label_x >= 0 && label_x < cols - 30 && label_y >= 0 && label_y < rows {
                imgproc::put_text(
                    frame,
                    &obj.id.to_string(),
                    Point::new(label_x, label_y),
                    imgproc::FONT_HERSHEY_SIMPLEX,
                    font_scale,
                    white(),
                    1,
                    imgproc::LINE_AA,
                    false,
                )?;
            }
        }

        // Pass 4: dashed lines between connected centers.
        for (pt1, pt2) in connections {
            draw_dashed_line(frame, pt1, pt2, white(), 1, DASH_LENGTH)?;
        }

        Ok(())
    }
}

/// Inverts pixel values inside `rect`, intersected with the frame bounds.
fn invert_region(frame: &mut Mat, rect: Rect) -> opencv::Result<()> {
    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = (rect.x + rect.width).min(frame.cols());
    let y1 = (rect.y + rect.height).min(frame.rows());

    if x1 <= x0 || y1 <= y0 {
        return Ok(());
    }

    let clipped = Rect::new(x0, y0, x1 - x0, y1 - y0);
    let mut roi = Mat::roi(frame, clipped)?;
    let src = roi.try_clone()?;
    core::bitwise_not(&src, &mut roi, &Mat::default())?;

    Ok(())
}

/// Dashed segment with 10 px dash/gap units; segments shorter than one dash
/// unit draw nothing.
fn draw_dashed_line(
    frame: &mut Mat,
    pt1: Point,
    pt2: Point,
    color: Scalar,
    thickness: i32,
    dash_length: i32,
) -> opencv::Result<()> {
    let dx = (pt2.x - pt1.x) as f32;
    let dy = (pt2.y - pt1.y) as f32;
    let dist = (dx * dx + dy * dy).sqrt();

    let dashes = (dist / dash_length as f32) as i32;
    if dashes == 0 {
        return Ok(());
    }

    let mut i = 0;
    while i < dashes {
        let start_ratio = i as f32 / dashes as f32;
        let end_ratio = ((i + 1) as f32 / dashes as f32).min(1.0);

        let start = Point::new(
            (pt1.x as f32 + dx * start_ratio) as i32,
            (pt1.y as f32 + dy * start_ratio) as i32,
        );
        let end = Point::new(
            (pt1.x as f32 + dx * end_ratio) as i32,
            (pt1.y as f32 + dy * end_ratio) as i32,
        );

        imgproc::line(frame, start, end, color, thickness, imgproc::LINE_AA, 0)?;

        i += 2;
    }

    Ok(())
}
