use crate::{
    error::Error,
    frame::{Frame, Orientation, PixelFormat, Rotation},
};
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "camera")]
mod cv;
#[cfg(feature = "camera")]
pub use self::cv::OpenCvCapture;

/// Consecutive grab failures tolerated before the session gives up.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    /// Capture device index.
    pub device: i32,
    /// Requested width, or the device default.
    pub width: Option<u32>,
    /// Requested height, or the device default.
    pub height: Option<u32>,
    pub orientation: Orientation,
}

impl CameraConfig {
    /// Every frame is delivered in this layout.
    pub const FORMAT: PixelFormat = PixelFormat::Bgra8;
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: 0,
            width: None,
            height: None,
            orientation: Orientation {
                mirror: true,
                rotation: Rotation::None,
            },
        }
    }
}

/// Answer from the host platform about camera use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Authorization {
    NotDetermined,
    Granted,
    Denied,
}

/// Platform permission hook.
pub trait Authorizer: Send {
    fn status(&self) -> Authorization;

    /// Prompt the user. Only called while the status is undetermined.
    fn request_access(&mut self) -> Authorization;
}

/// Authorizer for platforms without a permission model.
#[derive(Debug, Copy, Clone, Default)]
pub struct AlwaysGranted;

impl Authorizer for AlwaysGranted {
    fn status(&self) -> Authorization {
        Authorization::Granted
    }

    fn request_access(&mut self) -> Authorization {
        Authorization::Granted
    }
}

/// The thin device wrapper a [`Session`] drives.
pub trait Capture: Send {
    fn open(&mut self, config: &CameraConfig) -> Result<(), Error>;

    /// Block until the device delivers a frame.
    fn grab(&mut self) -> Result<Frame, Error>;

    fn close(&mut self);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
    /// Camera use was denied. Nothing is retried until the user acts.
    Unauthorized,
}

impl SessionState {
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

/// A capture session: authorization, device lifetime and frame orientation.
pub struct Session<C, A> {
    capture: C,
    authorizer: A,
    config: CameraConfig,
    state: SessionState,
    next_sequence: u64,
    failures: u32,
}

impl<C, A> Session<C, A>
where
    C: Capture,
    A: Authorizer,
{
    pub fn new(capture: C, authorizer: A, config: CameraConfig) -> Self {
        Self {
            capture,
            authorizer,
            config,
            state: SessionState::Idle,
            next_sequence: 0,
            failures: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Start (or restart) capturing.
    ///
    /// Authorization is requested on first activation. A denial is reported
    /// as [`SessionState::Unauthorized`] rather than as an error.
    #[instrument(name = "Session::start", skip(self), fields(device = self.config.device))]
    pub fn start(&mut self) -> Result<SessionState, Error> {
        if self.state.is_running() {
            return Ok(self.state);
        }

        let authorization = match self.authorizer.status() {
            Authorization::NotDetermined => self.authorizer.request_access(),
            status => status,
        };

        if authorization != Authorization::Granted {
            warn!(message = "camera access denied");
            self.state = SessionState::Unauthorized;
            return Ok(self.state);
        }

        self.capture.open(&self.config)?;
        self.failures = 0;
        self.state = SessionState::Running;
        info!(message = "capture session running");
        Ok(self.state)
    }

    pub fn stop(&mut self) {
        if self.state.is_running() {
            self.capture.close();
            self.state = SessionState::Stopped;
            info!(message = "capture session stopped");
        }
    }

    /// Next oriented frame, or `None` once the session is not running.
    ///
    /// Grab failures are skipped; after [`MAX_CONSECUTIVE_FAILURES`] in a row
    /// the session stops.
    pub fn next_frame(&mut self) -> Option<Frame> {
        while self.state.is_running() {
            match self.capture.grab() {
                Ok(frame) => {
                    self.failures = 0;
                    let sequence = self.next_sequence;
                    self.next_sequence += 1;
                    return Some(
                        self.config
                            .orientation
                            .apply(frame)
                            .with_sequence(sequence),
                    );
                }
                Err(error) => {
                    self.failures += 1;
                    debug!(message = "dropped frame", %error, failures = self.failures);
                    if self.failures >= MAX_CONSECUTIVE_FAILURES {
                        warn!(message = "too many consecutive capture failures", %error);
                        self.stop();
                    }
                }
            }
        }
        None
    }

    /// The frames of this session as an iterator. It ends when the session stops.
    pub fn frames(&mut self) -> Frames<'_, C, A> {
        Frames { session: self }
    }
}

pub struct Frames<'a, C, A> {
    session: &'a mut Session<C, A>,
}

impl<'a, C, A> Iterator for Frames<'a, C, A>
where
    C: Capture,
    A: Authorizer,
{
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        self.session.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::solid_frame;
    use std::collections::VecDeque;

    /// Replays a scripted sequence of grab outcomes.
    struct Scripted {
        grabs: VecDeque<Result<Frame, Error>>,
        opened: usize,
        closed: usize,
    }

    impl Scripted {
        fn new(grabs: Vec<Result<Frame, Error>>) -> Self {
            Self {
                grabs: grabs.into(),
                opened: 0,
                closed: 0,
            }
        }
    }

    impl Capture for Scripted {
        fn open(&mut self, _config: &CameraConfig) -> Result<(), Error> {
            self.opened += 1;
            Ok(())
        }

        fn grab(&mut self) -> Result<Frame, Error> {
            self.grabs
                .pop_front()
                .unwrap_or(Err(Error::FrameBufferTooSmall {
                    expected: 1,
                    actual: 0,
                }))
        }

        fn close(&mut self) {
            self.closed += 1;
        }
    }

    struct Prompt(Authorization, usize);

    impl Authorizer for Prompt {
        fn status(&self) -> Authorization {
            if self.1 == 0 {
                Authorization::NotDetermined
            } else {
                self.0
            }
        }

        fn request_access(&mut self) -> Authorization {
            self.1 += 1;
            self.0
        }
    }

    fn plain() -> CameraConfig {
        CameraConfig {
            orientation: Orientation::default(),
            ..CameraConfig::default()
        }
    }

    #[test]
    fn frames_are_numbered_in_arrival_order() {
        let capture = Scripted::new(vec![
            Ok(solid_frame(2, 2, [0, 0, 0, 255])),
            Ok(solid_frame(2, 2, [0, 0, 0, 255])),
        ]);
        let mut session = Session::new(capture, AlwaysGranted, plain());
        assert_eq!(session.next_frame(), None);
        assert_eq!(session.start().unwrap(), SessionState::Running);
        let sequences: Vec<_> = session.frames().take(2).map(|f| f.sequence()).collect();
        assert_eq!(sequences, vec![0, 1]);
    }

    #[test]
    fn denied_access_yields_no_frames() {
        let capture = Scripted::new(vec![Ok(solid_frame(2, 2, [0, 0, 0, 255]))]);
        let mut session = Session::new(capture, Prompt(Authorization::Denied, 0), plain());
        assert_eq!(session.start().unwrap(), SessionState::Unauthorized);
        assert_eq!(session.next_frame(), None);
        assert_eq!(session.capture.opened, 0);

        // the prompt is not shown twice
        assert_eq!(session.start().unwrap(), SessionState::Unauthorized);
        assert_eq!(session.authorizer.1, 1);
    }

    #[test]
    fn transient_failures_are_skipped() {
        let capture = Scripted::new(vec![
            Err(Error::EmptyFrame(0, 0)),
            Err(Error::EmptyFrame(0, 0)),
            Ok(solid_frame(4, 2, [0, 0, 0, 255])),
        ]);
        let mut session = Session::new(capture, AlwaysGranted, plain());
        session.start().unwrap();
        let frame = session.next_frame().unwrap();
        assert_eq!(frame.sequence(), 0);
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn persistent_failures_stop_the_session() {
        let mut session = Session::new(Scripted::new(vec![]), AlwaysGranted, plain());
        session.start().unwrap();
        assert_eq!(session.next_frame(), None);
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.capture.closed, 1);

        // a stopped session needs an explicit restart
        assert_eq!(session.next_frame(), None);
        assert_eq!(session.start().unwrap(), SessionState::Running);
        assert_eq!(session.capture.opened, 2);
    }

    #[test]
    fn orientation_is_applied() {
        let capture = Scripted::new(vec![Ok(solid_frame(4, 2, [0, 0, 0, 255]))]);
        let config = CameraConfig {
            orientation: Orientation {
                mirror: true,
                rotation: Rotation::Clockwise90,
            },
            ..CameraConfig::default()
        };
        let mut session = Session::new(capture, AlwaysGranted, config);
        session.start().unwrap();
        let frame = session.next_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (2, 4));
    }
}
