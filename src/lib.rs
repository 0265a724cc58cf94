pub mod app;
pub mod bridge;
pub mod cli;
pub mod clock;
pub mod emitter;
pub mod gpu;
pub mod heightfield;
pub mod scene;
pub mod sdk;
pub mod volume;
