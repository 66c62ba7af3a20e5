pub mod calibration;
pub mod features;
pub mod realtime;
pub mod smoothing;
pub mod training;
