use crate::{
    frame::Frame,
    pipeline::InferenceResult,
    pose::{
        constants::{HIGH_CONFIDENCE, MEDIUM_CONFIDENCE, SKELETON},
        KeypointKind, Point, Pose, NUM_KEYPOINTS,
    },
};
use std::sync::Arc;

/// A width and height in pixels.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn of_frame(frame: &Frame) -> Self {
        Self::new(frame.width() as f32, frame.height() as f32)
    }

    pub fn is_empty(self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn center(&self) -> ScreenPoint {
        ScreenPoint {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }
}

/// Aspect-fit placement of a video frame inside a viewport.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AspectFit {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    frame: Size,
}

impl AspectFit {
    /// `None` when either size is empty.
    pub fn new(frame: Size, viewport: Size) -> Option<Self> {
        if frame.is_empty() || viewport.is_empty() {
            return None;
        }
        let scale = (viewport.width / frame.width).min(viewport.height / frame.height);
        Some(Self {
            scale,
            offset_x: (viewport.width - frame.width * scale) / 2.0,
            offset_y: (viewport.height - frame.height * scale) / 2.0,
            frame,
        })
    }

    /// Where the video lands in the viewport.
    pub fn video_rect(&self) -> Rect {
        Rect {
            x: self.offset_x,
            y: self.offset_y,
            width: self.frame.width * self.scale,
            height: self.frame.height * self.scale,
        }
    }

    /// Viewport position of a normalized frame point. Points outside the
    /// frame are not mapped.
    pub fn map(&self, point: Point) -> Option<ScreenPoint> {
        if !point.is_normalized() {
            return None;
        }
        Some(ScreenPoint {
            x: point.x * self.frame.width * self.scale + self.offset_x,
            y: point.y * self.frame.height * self.scale + self.offset_y,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn of(score: f32) -> Self {
        if score >= HIGH_CONFIDENCE {
            Self::High
        } else if score >= MEDIUM_CONFIDENCE {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Dot {
    pub kind: KeypointKind,
    pub position: ScreenPoint,
    pub tier: ConfidenceTier,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Line {
    pub from: KeypointKind,
    pub to: KeypointKind,
    pub start: ScreenPoint,
    pub end: ScreenPoint,
}

/// Everything the display draws for one pose.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Geometry {
    pub dots: Vec<Dot>,
    pub lines: Vec<Line>,
}

impl Geometry {
    pub fn is_empty(&self) -> bool {
        self.dots.is_empty() && self.lines.is_empty()
    }
}

/// Overlay geometry for `pose` with the default skeleton.
pub fn render(pose: &Pose, frame: Size, viewport: Size) -> Geometry {
    render_with(pose, frame, viewport, &SKELETON)
}

/// Overlay geometry for `pose`.
///
/// A joint gets a dot when it is visible and inside the frame. A connection
/// gets a line only when both of its joints got dots.
pub fn render_with(
    pose: &Pose,
    frame: Size,
    viewport: Size,
    connections: &[(KeypointKind, KeypointKind)],
) -> Geometry {
    let fit = match AspectFit::new(frame, viewport) {
        Some(fit) => fit,
        None => return Geometry::default(),
    };

    let mut positions = [None; NUM_KEYPOINTS];
    let mut geometry = Geometry::default();

    for keypoint in pose.keypoints.iter().filter(|k| k.is_visible()) {
        if let Some(position) = fit.map(keypoint.point) {
            positions[keypoint.index()] = Some(position);
            geometry.dots.push(Dot {
                kind: keypoint.kind,
                position,
                tier: ConfidenceTier::of(keypoint.score),
            });
        }
    }

    for &(from, to) in connections {
        if let (Some(start), Some(end)) = (positions[from.idx()], positions[to.idx()]) {
            geometry.lines.push(Line {
                from,
                to,
                start,
                end,
            });
        }
    }

    geometry
}

/// Keeps overlay geometry in step with the latest result and viewport.
#[derive(Debug, Default)]
pub struct OverlayRenderer {
    viewport: Option<Size>,
    result: Option<Arc<InferenceResult>>,
    geometry: Option<Geometry>,
    stale: bool,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        if self.viewport != Some(viewport) {
            self.viewport = Some(viewport);
            self.stale = true;
        }
    }

    /// Replace the displayed result. `None` hides the overlay.
    pub fn set_result(&mut self, result: Option<Arc<InferenceResult>>) {
        let same = match (&self.result, &result) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same {
            self.result = result;
            self.stale = true;
        }
    }

    /// Current geometry, recomputed if the result or viewport changed.
    /// `None` when there is nothing to draw.
    pub fn geometry(&mut self) -> Option<&Geometry> {
        if self.stale {
            self.geometry = match (&self.result, self.viewport) {
                (Some(result), Some(viewport)) => result
                    .person()
                    .map(|pose| render(pose, result.frame_size, viewport)),
                _ => None,
            };
            self.stale = false;
        }
        self.geometry.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::Timing, pose::pose_with_scores};
    use assert_approx_eq::assert_approx_eq;

    fn pose_at(points: &[(KeypointKind, f32, f32, f32)]) -> Pose {
        let mut pose = pose_with_scores(&[]);
        for &(kind, x, y, score) in points {
            let keypoint = &mut pose.keypoints[kind.idx()];
            keypoint.point = Point::new(x, y);
            keypoint.score = score;
        }
        pose
    }

    #[test]
    fn tall_frame_in_square_viewport() {
        let fit = AspectFit::new(Size::new(500.0, 1000.0), Size::new(1000.0, 1000.0)).unwrap();
        assert_approx_eq!(fit.scale, 1.0);
        assert_approx_eq!(fit.offset_x, 250.0);
        assert_approx_eq!(fit.offset_y, 0.0);

        let origin = fit.map(Point::new(0.0, 0.0)).unwrap();
        assert_approx_eq!(origin.x, 250.0);
        assert_approx_eq!(origin.y, 0.0);

        let corner = fit.map(Point::new(1.0, 1.0)).unwrap();
        assert_approx_eq!(corner.x, 750.0);
        assert_approx_eq!(corner.y, 1000.0);
    }

    #[test]
    fn center_maps_to_video_center() {
        let cases = [
            ((640.0, 480.0), (390.0, 844.0)),
            ((480.0, 640.0), (1920.0, 1080.0)),
            ((1080.0, 1920.0), (300.0, 300.0)),
            ((100.0, 100.0), (1.0, 5000.0)),
        ];
        for &((fw, fh), (vw, vh)) in cases.iter() {
            let fit = AspectFit::new(Size::new(fw, fh), Size::new(vw, vh)).unwrap();
            let center = fit.map(Point::new(0.5, 0.5)).unwrap();
            let expected = fit.video_rect().center();
            assert_approx_eq!(center.x, expected.x, 1e-3);
            assert_approx_eq!(center.y, expected.y, 1e-3);
            assert_approx_eq!(center.x, vw / 2.0, 1e-3);
            assert_approx_eq!(center.y, vh / 2.0, 1e-3);
        }
    }

    #[test]
    fn empty_sizes_produce_no_geometry() {
        assert!(AspectFit::new(Size::new(0.0, 10.0), Size::new(10.0, 10.0)).is_none());
        let pose = pose_at(&[(KeypointKind::Nose, 0.5, 0.5, 0.9)]);
        assert!(render(&pose, Size::new(10.0, 10.0), Size::default()).is_empty());
    }

    #[test]
    fn only_confident_joints_and_their_connections_are_drawn() {
        use KeypointKind::*;
        let pose = pose_at(&[
            (Nose, 0.5, 0.2, 0.9),
            (LeftEye, 0.45, 0.18, 0.1),
            (RightEye, 0.55, 0.18, 0.5),
        ]);
        let geometry = render(&pose, Size::new(100.0, 100.0), Size::new(100.0, 100.0));

        let kinds: Vec<_> = geometry.dots.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![Nose, RightEye]);
        assert_eq!(geometry.lines.len(), 1);
        assert_eq!((geometry.lines[0].from, geometry.lines[0].to), (Nose, RightEye));
        assert!(geometry
            .lines
            .iter()
            .all(|line| line.from != LeftEye && line.to != LeftEye));
    }

    #[test]
    fn threshold_boundary_is_exclusive() {
        use KeypointKind::*;
        let pose = pose_at(&[(Nose, 0.5, 0.5, 0.3), (LeftEye, 0.5, 0.5, 0.30001)]);
        let geometry = render(&pose, Size::new(10.0, 10.0), Size::new(10.0, 10.0));
        let kinds: Vec<_> = geometry.dots.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![LeftEye]);
        assert!(geometry.lines.is_empty());
    }

    #[test]
    fn lines_need_both_endpoints() {
        use KeypointKind::*;
        let pose = pose_at(&[
            (LeftShoulder, 0.4, 0.4, 0.99),
            (LeftElbow, 0.4, 0.6, 0.29),
            (RightShoulder, 0.6, 0.4, 0.8),
        ]);
        let geometry = render(&pose, Size::new(10.0, 10.0), Size::new(10.0, 10.0));
        assert_eq!(geometry.dots.len(), 2);
        assert_eq!(geometry.lines.len(), 1);
        assert_eq!(
            (geometry.lines[0].from, geometry.lines[0].to),
            (LeftShoulder, RightShoulder)
        );
    }

    #[test]
    fn points_outside_the_frame_are_skipped() {
        let pose = pose_at(&[(KeypointKind::Nose, 1.2, 0.5, 0.9)]);
        assert!(render(&pose, Size::new(10.0, 10.0), Size::new(10.0, 10.0)).is_empty());
    }

    #[test]
    fn tiers_follow_confidence_bands() {
        assert_eq!(ConfidenceTier::of(0.95), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::of(0.7), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::of(0.6), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::of(0.31), ConfidenceTier::Low);
    }

    #[test]
    fn renderer_recomputes_on_viewport_and_result_changes() {
        let pose = pose_with_scores(&[0.9; NUM_KEYPOINTS]);
        let result = Arc::new(InferenceResult {
            sequence: 3,
            frame_size: Size::new(100.0, 100.0),
            pose,
            timing: Timing::default(),
        });

        let mut renderer = OverlayRenderer::new();
        renderer.set_result(Some(result.clone()));
        assert!(renderer.geometry().is_none());

        renderer.set_viewport(Size::new(100.0, 100.0));
        let first = renderer.geometry().unwrap().dots[0].position;
        assert_approx_eq!(first.x, 50.0);

        renderer.set_viewport(Size::new(200.0, 100.0));
        let second = renderer.geometry().unwrap().dots[0].position;
        assert_approx_eq!(second.x, 100.0);
        assert_approx_eq!(second.y, 50.0);

        renderer.set_result(None);
        assert!(renderer.geometry().is_none());
    }

    #[test]
    fn weak_poses_have_no_overlay() {
        let result = Arc::new(InferenceResult {
            sequence: 0,
            frame_size: Size::new(100.0, 100.0),
            pose: pose_with_scores(&[0.1; NUM_KEYPOINTS]),
            timing: Timing::default(),
        });
        let mut renderer = OverlayRenderer::new();
        renderer.set_viewport(Size::new(100.0, 100.0));
        renderer.set_result(Some(result));
        assert!(renderer.geometry().is_none());
    }
}
