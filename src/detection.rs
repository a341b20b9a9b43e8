use nalgebra as na;
use opencv::core::Rect;
use serde_derive::{Deserialize, Serialize};

/// One candidate object found in a single frame.
///
/// Contains (x,y) of the center and (width,height) of bbox, in pixel
/// coordinates of the source frame. Produced fresh by a detection backend
/// each frame and consumed immediately by the tracker.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(rename = "p")]
    pub confidence: f32,
}

impl Detection {
    pub fn new(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            confidence,
        }
    }

    /// Builds a detection from a left-top bbox, deriving the center.
    pub fn from_ltwh(left: f32, top: f32, w: f32, h: f32, confidence: f32) -> Self {
        Self {
            x: left + w / 2.,
            y: top + h / 2.,
            w,
            h,
            confidence,
        }
    }

    #[inline(always)]
    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new(self.x, self.y)
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.x - self.w / 2.
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.y - self.h / 2.
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.x + self.w / 2.
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.y + self.h / 2.
    }

    /// Integer pixel bbox as an OpenCV rect.
    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::new(
            self.left() as i32,
            self.top() as i32,
            self.w as i32,
            self.h as i32,
        )
    }

    /// Euclidean center-to-center distance in pixels.
    #[inline]
    pub fn distance_to(&self, other: &Detection) -> f32 {
        na::distance(&self.center(), &other.center())
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let b1_area = (self.w + 1.) * (self.h + 1.);
        let b2_area = (other.w + 1.) * (other.h + 1.);

        let i_xmin = self.left().max(other.left());
        let i_xmax = self.right().min(other.right());
        let i_ymin = self.top().max(other.top());
        let i_ymax = self.bottom().min(other.bottom());
        let i_area = (i_xmax - i_xmin + 1.).max(0.) * (i_ymax - i_ymin + 1.).max(0.);

        i_area / (b1_area + b2_area - i_area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_and_corners_agree() {
        let det = Detection::from_ltwh(10.0, 20.0, 40.0, 60.0, 0.9);
        assert_eq!(det.x, 30.0);
        assert_eq!(det.y, 50.0);
        assert_eq!(det.left(), 10.0);
        assert_eq!(det.top(), 20.0);

        let rect = det.rect();
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (10, 20, 40, 60));
    }

    #[test]
    fn distance_is_euclidean() {
        let a = Detection::new(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = Detection::new(3.0, 4.0, 10.0, 10.0, 1.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = Detection::new(50.0, 50.0, 20.0, 20.0, 1.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }
}
