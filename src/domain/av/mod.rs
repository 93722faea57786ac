//! Audio/Video domain modules.

pub mod frame_analysis;
pub mod luma;
pub mod scan;
pub mod scenes;
pub mod thumbnails;
