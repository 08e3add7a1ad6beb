pub mod renderer;
pub mod scene;
pub mod settings;

pub use renderer::{DrawingContext, GpuCommand, RenderNodeManager, WgpuExecutor};
pub use settings::RenderSettings;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
