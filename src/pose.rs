use std::fmt;

/// Joints in MoveNet output order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum KeypointKind {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

pub const NUM_KEYPOINTS: usize = 17;

impl KeypointKind {
    pub const ALL: [KeypointKind; NUM_KEYPOINTS] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    #[inline]
    pub fn idx(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }
}

impl fmt::Display for KeypointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A point in normalized image space, origin top-left.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Whether both coordinates fall inside the unit square.
    pub fn is_normalized(self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Keypoint {
    pub kind: KeypointKind,
    pub point: Point,
    pub score: f32,
}

impl Keypoint {
    #[inline]
    pub fn index(&self) -> usize {
        self.kind.idx()
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Whether this joint clears the overlay threshold. The comparison is strict.
    #[inline]
    pub fn is_visible(&self) -> bool {
        self.score > constants::KEYPOINT_THRESHOLD
    }
}

pub type Keypoints = [Keypoint; NUM_KEYPOINTS];

/// One decoded person: all joints, in model order.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Pose {
    pub keypoints: Keypoints,
    pub score: f32,
}

impl Pose {
    /// Build a pose whose overall score is the mean joint confidence.
    pub fn new(keypoints: Keypoints) -> Self {
        let score = keypoints.iter().map(|k| k.score).sum::<f32>() / NUM_KEYPOINTS as f32;
        Self { keypoints, score }
    }

    /// Whether the pose is confident enough to be shown at all.
    pub fn is_person(&self) -> bool {
        self.score > constants::MIN_POSE_SCORE
    }

    /// Apply `f` to every joint position, keeping kinds and scores.
    pub fn map_points<F>(&self, mut f: F) -> Self
    where
        F: FnMut(Point) -> Point,
    {
        let mut keypoints = self.keypoints;
        for keypoint in keypoints.iter_mut() {
            keypoint.point = f(keypoint.point);
        }
        Self {
            keypoints,
            score: self.score,
        }
    }
}

pub mod constants {
    use crate::pose::KeypointKind::{self, *};

    /// Joints at or below this confidence are hidden from the overlay.
    pub const KEYPOINT_THRESHOLD: f32 = 0.3;

    /// Poses at or below this mean confidence are reported as no person.
    pub const MIN_POSE_SCORE: f32 = 0.2;

    pub const HIGH_CONFIDENCE: f32 = 0.7;
    pub const MEDIUM_CONFIDENCE: f32 = 0.5;

    pub const SKELETON: [(KeypointKind, KeypointKind); 18] = [
        // head
        (Nose, LeftEye),
        (Nose, RightEye),
        (LeftEye, LeftEar),
        (RightEye, RightEar),
        (Nose, LeftShoulder),
        (Nose, RightShoulder),
        // arms
        (LeftShoulder, RightShoulder),
        (LeftShoulder, LeftElbow),
        (RightShoulder, RightElbow),
        (LeftElbow, LeftWrist),
        (RightElbow, RightWrist),
        // torso
        (LeftShoulder, LeftHip),
        (RightShoulder, RightHip),
        (LeftHip, RightHip),
        // legs
        (LeftHip, LeftKnee),
        (RightHip, RightKnee),
        (LeftKnee, LeftAnkle),
        (RightKnee, RightAnkle),
    ];
}

#[cfg(test)]
pub(crate) fn pose_with_scores(scores: &[f32]) -> Pose {
    let keypoints = std::array::from_fn(|i| Keypoint {
        kind: KeypointKind::ALL[i],
        point: Point::new(0.5, 0.5),
        score: scores.get(i).copied().unwrap_or(0.0),
    });
    Pose::new(keypoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn kinds_follow_model_order() {
        for (index, kind) in KeypointKind::ALL.iter().enumerate() {
            assert_eq!(kind.idx(), index);
        }
    }

    #[test]
    fn names_are_snake_case() {
        assert_eq!(KeypointKind::LeftShoulder.name(), "left_shoulder");
        assert_eq!(KeypointKind::RightAnkle.to_string(), "right_ankle");
    }

    #[test]
    fn threshold_is_strict() {
        let pose = pose_with_scores(&[0.3, 0.30001]);
        assert!(!pose.keypoints[0].is_visible());
        assert!(pose.keypoints[1].is_visible());
    }

    #[test]
    fn pose_score_is_mean_confidence() {
        let pose = pose_with_scores(&[0.5; NUM_KEYPOINTS]);
        assert_approx_eq!(pose.score, 0.5);
        assert!(pose.is_person());

        let weak = pose_with_scores(&[0.1; NUM_KEYPOINTS]);
        assert!(!weak.is_person());
    }

    #[test]
    fn skeleton_references_valid_joints() {
        for (from, to) in constants::SKELETON.iter() {
            assert_ne!(from, to);
            assert!(from.idx() < NUM_KEYPOINTS && to.idx() < NUM_KEYPOINTS);
        }
    }
}
