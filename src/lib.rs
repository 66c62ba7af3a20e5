pub mod dataset;
pub mod devices;
pub mod error;
pub mod gaze_config;
pub mod geometry_utils;
pub mod model;
pub mod replay;
pub mod systems;

pub type Point2D = (f32, f32);
