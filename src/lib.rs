pub mod animation;
pub mod clock;
pub mod config;
pub mod geometry;
pub mod gestures;
pub mod integrator;
pub mod interaction;
pub mod landmarks;
pub mod replay;
pub mod session;
