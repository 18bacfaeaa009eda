//! GStreamer-based camera capture.
//!
//! Builds a platform-appropriate pipeline ending in `jpegenc ! appsink`, so
//! the rest of the crate only ever sees encoded JPEG frames as [`Bytes`] on
//! an mpsc channel. When the transmission loop lags, the newest frames win:
//! the channel is bounded and older frames are dropped and counted.

mod platform;

pub use platform::Platform;

use bytes::Bytes;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::CameraConfig;

/// Frames buffered between the camera callback and the transmission loop.
const FRAME_CHANNEL_DEPTH: usize = 5;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("GStreamer error: {0}")]
    Gst(#[from] gst::glib::Error),

    #[error("state change error: {0}")]
    StateChange(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),
}

/// Statistics for capture
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    pub frames_encoded: u64,
    pub frames_dropped: u64,
    pub is_running: bool,
}

/// Camera capture producing encoded JPEG frames.
pub struct Capture {
    config: CameraConfig,

    pipeline: Option<gst::Pipeline>,

    is_running: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
    drop_count: Arc<AtomicU64>,
}

impl Capture {
    pub fn new(config: CameraConfig) -> Result<Self, CaptureError> {
        gst::init()?;

        Ok(Self {
            config,
            pipeline: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frame_count: Arc::new(AtomicU64::new(0)),
            drop_count: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Starts the camera and returns the encoded-frame channel.
    ///
    /// Failure here is fatal for the process: a robot streaming nothing is a
    /// misconfiguration the operator has to see at startup, not in a log
    /// tail hours later.
    pub async fn start(&mut self) -> Result<mpsc::Receiver<Bytes>, CaptureError> {
        if self.is_running.load(Ordering::Relaxed) {
            return Err(CaptureError::Pipeline("already running".to_string()));
        }

        info!(
            device = %self.config.device,
            resolution = %format!("{}x{}", self.config.width, self.config.height),
            fps = %self.config.fps,
            quality = %self.config.quality,
            "Starting camera capture"
        );

        let pipeline_desc = self.pipeline_description(Platform::detect());
        debug!(pipeline = %pipeline_desc, "Creating GStreamer pipeline");

        let pipeline = gst::parse::launch(&pipeline_desc)?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| CaptureError::Pipeline("not a pipeline".to_string()))?;

        let app_sink = pipeline
            .by_name("sink")
            .ok_or_else(|| CaptureError::Pipeline("no appsink found".to_string()))?
            .dynamic_cast::<gst_app::AppSink>()
            .map_err(|_| CaptureError::Pipeline("not an appsink".to_string()))?;

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_DEPTH);

        app_sink.set_property("max-buffers", 2u32);
        app_sink.set_property("drop", true);
        app_sink.set_property("emit-signals", false);

        let frame_count = Arc::clone(&self.frame_count);
        let drop_count = Arc::clone(&self.drop_count);
        let is_running = Arc::clone(&self.is_running);

        app_sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    if !is_running.load(Ordering::Relaxed) {
                        return Ok(gst::FlowSuccess::Ok);
                    }

                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Error)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

                    // The buffer belongs to the pipeline; one copy into Bytes
                    let jpeg = Bytes::copy_from_slice(map.as_slice());

                    match frame_tx.try_send(jpeg) {
                        Ok(_) => {
                            frame_count.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            drop_count.fetch_add(1, Ordering::Relaxed);
                        }
                    }

                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CaptureError::StateChange(format!("{:?}", e)))?;

        self.pipeline = Some(pipeline);
        self.is_running.store(true, Ordering::Relaxed);

        info!("Camera capture started");

        Ok(frame_rx)
    }

    /// Stops capture
    pub async fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        self.is_running.store(false, Ordering::Relaxed);

        if let Some(pipeline) = self.pipeline.take() {
            pipeline
                .set_state(gst::State::Null)
                .map_err(|e| CaptureError::StateChange(format!("{:?}", e)))?;
        }

        let stats = self.stats();
        info!(
            frames = %stats.frames_encoded,
            dropped = %stats.frames_dropped,
            "Camera capture stopped"
        );

        Ok(())
    }

    /// Builds the pipeline description for `platform`.
    fn pipeline_description(&self, platform: Platform) -> String {
        let mut desc = format!(
            "{} ! video/x-raw,width={},height={},framerate={}/1",
            platform.source_element(&self.config.device),
            self.config.width,
            self.config.height,
            self.config.fps
        );

        if let Some(ref flip) = self.config.flip_method {
            desc.push_str(&flip_element(flip));
        }

        desc.push_str(&format!(
            " ! queue max-size-buffers=2 leaky=downstream ! videoconvert ! jpegenc quality={} ! appsink name=sink",
            self.config.quality
        ));

        desc
    }

    /// Gets capture statistics
    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_encoded: self.frame_count.load(Ordering::Relaxed),
            frames_dropped: self.drop_count.load(Ordering::Relaxed),
            is_running: self.is_running.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Relaxed);
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gst::State::Null);
        }
    }
}

fn flip_element(method: &str) -> String {
    match method {
        "vertical-flip" => " ! videoflip video-direction=5".to_string(),
        "horizontal-flip" => " ! videoflip video-direction=4".to_string(),
        "rotate-180" => " ! videoflip video-direction=2".to_string(),
        "rotate-90" => " ! videoflip video-direction=1".to_string(),
        "rotate-270" => " ! videoflip video-direction=3".to_string(),
        _ => {
            warn!(method = %method, "Unknown flip method");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CameraConfig {
        CameraConfig {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fps: 20,
            quality: 80,
            flip_method: None,
        }
    }

    #[test]
    fn test_pipeline_description_linux() {
        let capture = Capture {
            config: test_config(),
            pipeline: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frame_count: Arc::new(AtomicU64::new(0)),
            drop_count: Arc::new(AtomicU64::new(0)),
        };

        let desc = capture.pipeline_description(Platform::Linux);
        assert!(desc.starts_with("v4l2src device=/dev/video0"));
        assert!(desc.contains("width=640,height=480,framerate=20/1"));
        assert!(desc.contains("jpegenc quality=80"));
        assert!(desc.ends_with("appsink name=sink"));
    }

    #[test]
    fn test_pipeline_description_with_flip() {
        let mut config = test_config();
        config.flip_method = Some("rotate-180".to_string());

        let capture = Capture {
            config,
            pipeline: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frame_count: Arc::new(AtomicU64::new(0)),
            drop_count: Arc::new(AtomicU64::new(0)),
        };

        let desc = capture.pipeline_description(Platform::Linux);
        assert!(desc.contains("videoflip video-direction=2"));
    }
}
