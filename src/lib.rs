//! MJPEG-over-UDP streaming for camera-equipped robots.
//!
//! Three workers share two registries:
//! - a subscription listener registers the video destination,
//! - a command listener accepts steering tokens (and can bootstrap the
//!   destination when no subscriber ever registered),
//! - a transmission loop fragments camera JPEG frames into small datagrams
//!   and sends them to whichever destination is current.
//!
//! # Example
//!
//! ```no_run
//! use robot_mjpeg_streamer::protocol::Packetizer;
//!
//! let packetizer = Packetizer::new(0x4D4A5047, 1300);
//! // ... capture JPEG frame
//! // let datagrams = packetizer.packetize(&jpeg_data);
//! ```

pub mod actuator;
pub mod capture;
pub mod config;
pub mod control;
pub mod protocol;
pub mod registry;
pub mod streamer;

// Re-exports for convenience
pub use actuator::{CommandSink, LogActuator};
pub use capture::{Capture, CaptureStats, Platform};
pub use control::{CommandListener, ControlMessage, SubscriptionListener};
pub use protocol::{FrameAssembler, FrameHeader, Packetizer, PacketizerStats};
pub use registry::{CommandRegistry, DestinationRegistry};
pub use streamer::{Streamer, StreamerStats};
