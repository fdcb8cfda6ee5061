//! rollcall-hw — frame sources for attendance sessions.
//!
//! A V4L2 camera and a directory replay source, both implementing
//! [`rollcall_core::FrameSource`].

pub mod camera;
pub mod frame;
pub mod replay;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use frame::PixelFormat;
pub use replay::ImageDirectorySource;
