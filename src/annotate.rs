//! Burns detections and violations into a copy of the frame for evidence.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::correlate::Violation;
use crate::detect::FrameDetections;
use crate::geometry::BoundingBox;

pub const VEHICLE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const PERSON_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
pub const NO_HELMET_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const BANNER_COLOR: Rgb<u8> = Rgb([200, 0, 0]);

const BANNER_HEIGHT: u32 = 24;

/// Returns an annotated copy; `image` is left untouched.
pub fn annotate(image: &RgbImage, detections: &FrameDetections, violations: &[Violation]) -> RgbImage {
    let mut out = image.clone();

    for v in &detections.vehicles {
        draw_box(&mut out, &v.bbox, VEHICLE_COLOR, 2);
    }
    for p in &detections.persons {
        draw_box(&mut out, &p.bbox, PERSON_COLOR, 2);
    }
    for nh in &detections.no_helmets {
        draw_box(&mut out, &nh.bbox, NO_HELMET_COLOR, 3);
    }
    for v in violations {
        draw_box(&mut out, &v.person_box, NO_HELMET_COLOR, 3);
    }

    if !violations.is_empty() && out.width() > 0 && out.height() > 0 {
        let banner = Rect::at(0, 0).of_size(out.width(), BANNER_HEIGHT.min(out.height()));
        draw_filled_rect_mut(&mut out, banner, BANNER_COLOR);
    }
    out
}

/// Draws `thickness` nested outlines growing inward. Malformed boxes are skipped.
fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    if bbox.validate().is_err() {
        return;
    }
    let x = bbox.x1.round() as i32;
    let y = bbox.y1.round() as i32;
    let w = bbox.width().round() as u32;
    let h = bbox.height().round() as u32;
    for t in 0..thickness {
        let (w, h) = (w.saturating_sub(2 * t), h.saturating_sub(2 * t));
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at(x + t as i32, y + t as i32).of_size(w, h);
        draw_hollow_rect_mut(image, rect, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;
    use std::time::SystemTime;

    fn scene() -> FrameDetections {
        FrameDetections {
            persons: vec![Detection::person(BoundingBox::new(10.0, 30.0, 40.0, 90.0), 0.9)],
            vehicles: vec![Detection::vehicle(BoundingBox::new(5.0, 60.0, 50.0, 99.0), 0.9)],
            no_helmets: vec![Detection::no_helmet(BoundingBox::new(20.0, 30.0, 30.0, 40.0), 0.9)],
        }
    }

    fn violation() -> Violation {
        Violation {
            frame_seq: 1,
            frame_name: "frame".into(),
            person_box: BoundingBox::new(10.0, 30.0, 40.0, 90.0),
            person_confidence: 0.9,
            vehicle_box: BoundingBox::new(5.0, 60.0, 50.0, 99.0),
            no_helmet_box: BoundingBox::new(20.0, 30.0, 30.0, 40.0),
            detected_at: SystemTime::UNIX_EPOCH,
            fine_amount: 500,
        }
    }

    #[test]
    fn draws_boxes_on_a_copy() {
        let original = RgbImage::new(100, 100);
        let out = annotate(&original, &scene(), &[]);
        assert_eq!(original.get_pixel(5, 60), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(5, 60), &VEHICLE_COLOR);
        assert_eq!(out.get_pixel(10, 50), &PERSON_COLOR);
        // No banner without a violation.
        assert_eq!(out.get_pixel(70, 5), &Rgb([0, 0, 0]));
    }

    #[test]
    fn banner_marks_violation_frames() {
        let out = annotate(&RgbImage::new(100, 100), &scene(), &[violation()]);
        assert_eq!(out.get_pixel(70, 5), &BANNER_COLOR);
    }

    #[test]
    fn tolerates_degenerate_and_out_of_frame_boxes() {
        let mut dets = scene();
        dets.persons
            .push(Detection::person(BoundingBox::new(50.0, 50.0, 50.0, 60.0), 0.9));
        dets.vehicles
            .push(Detection::vehicle(BoundingBox::new(-20.0, -20.0, 500.0, 500.0), 0.9));
        let out = annotate(&RgbImage::new(64, 64), &dets, &[violation()]);
        assert_eq!(out.dimensions(), (64, 64));
    }
}
