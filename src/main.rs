use anyhow::{anyhow, Context, Result};
use formfit_pose::{
    camera::{AlwaysGranted, CameraConfig, OpenCvCapture, Session, SessionState},
    engine::{Backend, EngineConfig, ModelVariant},
    frame::{Orientation, Rotation},
    overlay::{OverlayRenderer, Size},
    pipeline::{Coordinator, DisplayState, PoseStatus},
    preprocess::ScaleMode,
    tflite::TfliteEngine,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use structopt::StructOpt;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;

#[cfg(feature = "gui")]
mod gui {
    use formfit_pose::{
        error::Error,
        frame::Frame,
        overlay::{AspectFit, ConfidenceTier, Geometry, ScreenPoint, Size},
    };
    use opencv::{
        core::{Mat, Point2i, Rect, Scalar, Size as CvSize, CV_8UC4},
        imgproc::{FONT_HERSHEY_SIMPLEX, INTER_LINEAR, LINE_8, LINE_AA},
        prelude::MatExprTrait,
    };

    const GREEN: (f64, f64, f64) = (0.0, 255.0, 0.0);
    const YELLOW: (f64, f64, f64) = (0.0, 255.0, 255.0);
    const RED: (f64, f64, f64) = (0.0, 0.0, 255.0);
    const WHITE: (f64, f64, f64) = (255.0, 255.0, 255.0);

    fn to_point(point: ScreenPoint) -> Point2i {
        Point2i::new(point.x.round() as i32, point.y.round() as i32)
    }

    fn tier_color(tier: ConfidenceTier) -> Scalar {
        Scalar::from(match tier {
            ConfidenceTier::High => GREEN,
            ConfidenceTier::Medium => YELLOW,
            ConfidenceTier::Low => RED,
        })
    }

    fn blank(viewport: Size) -> Result<Mat, Error> {
        Mat::zeros(
            viewport.height.round() as i32,
            viewport.width.round() as i32,
            CV_8UC4,
        )
        .and_then(|zeros| zeros.to_mat())
        .map_err(Error::WrapFrame)
    }

    fn present(mut canvas: Mat, text: &str) -> Result<(), Error> {
        opencv::imgproc::put_text(
            &mut canvas,
            text,
            Point2i::new(0, 15),
            FONT_HERSHEY_SIMPLEX,
            0.5,
            Scalar::from(WHITE),
            1,       // thickness
            LINE_AA, // line_type
            false,   // bottom_left_origin
        )
        .map_err(Error::PutText)?;
        opencv::highgui::imshow("poses", &canvas).map_err(Error::ImShow)
    }

    /// An empty viewport with only the status line, for when no frame has
    /// arrived.
    pub(crate) fn placeholder(viewport: Size, text: &str) -> Result<(), Error> {
        present(blank(viewport)?, text)
    }

    /// Letterbox `frame` into the viewport and draw `geometry` on top.
    pub(crate) fn show(
        frame: &Frame,
        viewport: Size,
        geometry: Option<&Geometry>,
        text: &str,
    ) -> Result<(), Error> {
        let mut canvas = blank(viewport)?;

        if let Some(fit) = AspectFit::new(Size::of_frame(frame), viewport) {
            // SAFETY: the Mat borrows the frame buffer for the duration of this
            // call and opencv only reads from it
            let source = unsafe {
                Mat::new_rows_cols_with_data(
                    frame.height() as i32,
                    frame.width() as i32,
                    CV_8UC4,
                    frame.data().as_ptr() as *mut _,
                    frame.stride(),
                )
            }
            .map_err(Error::WrapFrame)?;
            let video = fit.video_rect();
            let rect = Rect::new(
                video.x.round() as i32,
                video.y.round() as i32,
                video.width.round() as i32,
                video.height.round() as i32,
            );
            let mut target = Mat::roi(&canvas, rect).map_err(Error::WrapFrame)?;
            opencv::imgproc::resize(
                &source,
                &mut target,
                CvSize::new(rect.width, rect.height),
                0.0,
                0.0,
                INTER_LINEAR,
            )
            .map_err(Error::WrapFrame)?;
        }

        if let Some(geometry) = geometry {
            for line in geometry.lines.iter() {
                opencv::imgproc::line(
                    &mut canvas,
                    to_point(line.start),
                    to_point(line.end),
                    Scalar::from(WHITE),
                    2,      // thickness
                    LINE_8, // line_type
                    0,      // shift
                )
                .map_err(Error::DrawLine)?;
            }
            for dot in geometry.dots.iter() {
                opencv::imgproc::circle(
                    &mut canvas,
                    to_point(dot.position),
                    6,
                    tier_color(dot.tier),
                    -1,     // filled
                    LINE_8, // line_type
                    0,      // shift
                )
                .map_err(Error::DrawCircle)?;
            }
        }

        present(canvas, text)
    }

    pub(crate) fn wait_q(delay_ms: i32) -> anyhow::Result<bool> {
        const Q_KEY: u8 = b'q';
        Ok(opencv::highgui::wait_key(delay_ms)? != i32::from(Q_KEY))
    }
}

#[derive(structopt::StructOpt)]
struct Opt {
    /// Directory holding the MoveNet .tflite models.
    #[structopt(short, long, default_value = "models")]
    model_dir: PathBuf,

    /// Model variant: lightning or thunder.
    #[structopt(short, long, default_value = "thunder")]
    variant: ModelVariant,

    /// Interpreter threads, 1 to 8.
    #[structopt(short, long, default_value = "4")]
    threads: u8,

    /// Inference backend: cpu or edgetpu.
    #[structopt(short, long, default_value = "cpu")]
    backend: Backend,

    /// Video capture device index.
    #[structopt(short, long, default_value = "0")]
    device: i32,

    /// Requested capture width.
    #[structopt(long)]
    frame_width: Option<u32>,

    /// Requested capture height.
    #[structopt(long)]
    frame_height: Option<u32>,

    /// Don't mirror frames horizontally.
    #[structopt(long)]
    no_mirror: bool,

    /// Clockwise frame rotation in degrees: 0, 90, 180 or 270.
    #[structopt(short, long, default_value = "0")]
    rotation: Rotation,

    /// How frames are fitted into the model input: fit or fill.
    #[structopt(short, long, default_value = "fit")]
    scale_mode: ScaleMode,

    /// Width of the display viewport.
    #[structopt(long, default_value = "640")]
    viewport_width: u16,

    /// Height of the display viewport.
    #[structopt(long, default_value = "480")]
    viewport_height: u16,

    #[structopt(short = "-W", long, default_value = "1")]
    wait_key_ms: i32,

    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,

    #[structopt(short = "-p", long)]
    show_progress: bool,
}

const DISPLAY_TICK: Duration = Duration::from_millis(30);

fn status_text(display: &DisplayState, results: u64, elapsed: Duration) -> String {
    let (score, time) = match display.result.as_ref() {
        Some(result) => (result.score_text(), result.time_text()),
        None => ("-".to_owned(), "-".to_owned()),
    };
    let pose = match &display.pose {
        PoseStatus::Loading => "loading".to_owned(),
        PoseStatus::Ready => "ready".to_owned(),
        PoseStatus::Unavailable(reason) => format!("unavailable ({})", reason),
    };
    let camera = match display.camera {
        SessionState::Idle => "starting",
        SessionState::Running => "running",
        SessionState::Stopped => "stopped",
        SessionState::Unauthorized => "access denied",
    };
    format!(
        "score: {}, time: {}, model: {:.1} fps, camera: {}, pose: {}",
        score,
        time,
        results as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        camera,
        pose,
    )
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(opt.log_level),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrl_c = running.clone();

    ctrlc::set_handler(move || {
        running_ctrl_c.store(false, Ordering::SeqCst);
    })
    .context("failed setting Ctrl-C handler")?;

    let engine_config = EngineConfig {
        model_dir: opt.model_dir,
        variant: opt.variant,
        threads: opt.threads,
        backend: opt.backend,
    };
    let camera_config = CameraConfig {
        device: opt.device,
        width: opt.frame_width,
        height: opt.frame_height,
        orientation: Orientation {
            mirror: !opt.no_mirror,
            rotation: opt.rotation,
        },
    };
    let viewport = Size::new(f32::from(opt.viewport_width), f32::from(opt.viewport_height));

    let mut coordinator =
        Coordinator::new(TfliteEngine::new, opt.scale_mode).context("failed starting pipeline")?;
    if let Err(error) = coordinator.reconfigure(&engine_config) {
        warn!(message = "continuing without pose estimation", %error);
    }
    let results = coordinator.subscribe();

    let mut session = Session::new(OpenCvCapture::new(), AlwaysGranted, camera_config);
    let state = session.start().context("failed starting camera session")?;
    coordinator.set_camera_state(state);
    if state == SessionState::Unauthorized {
        warn!(message = "camera access was denied, showing status only");
    }

    let pb_model_cam_fps = if opt.show_progress {
        Some(
            ProgressBar::new_spinner().with_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                    .template("{prefix:.bold.dim} {spinner} {wide_msg}"),
            ),
        )
    } else {
        None
    };

    let wait_key_ms = opt.wait_key_ms;
    let coordinator_ref = &coordinator;
    let started = Instant::now();

    crossbeam::thread::scope(|scope| {
        let running_capture = running.clone();
        let capture = scope.spawn(move |_| {
            let mut frames = 0_u64;
            while running_capture.load(Ordering::SeqCst) {
                match session.next_frame() {
                    Some(frame) => {
                        frames += 1;
                        coordinator_ref.submit(frame);
                    }
                    None => {
                        warn!(message = "camera session ended", state = ?session.state());
                        break;
                    }
                }
            }
            session.stop();
            coordinator_ref.set_camera_state(session.state());
            frames
        });

        let running_display = running.clone();
        let display = scope.spawn(move |_| {
            let mut renderer = OverlayRenderer::new();
            renderer.set_viewport(viewport);
            let mut shown = 0_u64;

            while running_display.load(Ordering::SeqCst) {
                if results.recv_timeout(DISPLAY_TICK).is_some() {
                    shown += 1;
                }
                let display = coordinator_ref.display();
                renderer.set_result(display.result.clone());
                let text = status_text(&display, shown, started.elapsed());

                #[cfg(feature = "gui")]
                {
                    match display.frame.as_ref() {
                        Some(frame) => gui::show(frame, viewport, renderer.geometry(), &text),
                        None => gui::placeholder(viewport, &text),
                    }
                    .context("failed drawing poses")?;
                    if !gui::wait_q(wait_key_ms).context("failed waiting for 'q' key")? {
                        running_display.store(false, Ordering::SeqCst);
                    }
                }
                #[cfg(not(feature = "gui"))]
                {
                    let _ = wait_key_ms;
                    let dots = renderer.geometry().map_or(0, |geometry| geometry.dots.len());
                    tracing::trace!(message = "display", frame = display.frame.is_some(), dots);
                }

                if let Some(pb) = pb_model_cam_fps.as_ref() {
                    pb.set_message(text);
                    pb.inc(1);
                }
            }
            Ok::<_, anyhow::Error>(())
        });

        let frames = capture
            .join()
            .map_err(|_| anyhow!("capture thread panicked"))?;
        display
            .join()
            .map_err(|_| anyhow!("display thread panicked"))??;
        info!(message = "captured frames", frames);
        Ok::<_, anyhow::Error>(())
    })
    .map_err(|_| anyhow!("pipeline thread panicked"))??;

    coordinator.shutdown();
    let stats = coordinator.stats();
    info!(
        message = "pipeline stopped",
        processed = stats.processed,
        dropped = stats.dropped,
        failed = stats.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_without_frames_or_results() {
        let display = DisplayState::default();
        let text = status_text(&display, 0, Duration::from_secs(1));
        assert!(text.starts_with("score: -, time: -, model: 0.0 fps"));
        assert!(text.ends_with("camera: starting, pose: loading"));
    }

    #[test]
    fn status_reports_denied_camera_and_missing_engine() {
        let display = DisplayState {
            camera: SessionState::Unauthorized,
            pose: PoseStatus::Unavailable("model not found".to_owned()),
            ..DisplayState::default()
        };
        let text = status_text(&display, 0, Duration::from_secs(1));
        assert!(text.ends_with("camera: access denied, pose: unavailable (model not found)"));
    }
}
