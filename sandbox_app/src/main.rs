//! PBR sandbox
//!
//! Opens a window, renders a lit cube through an HDR target and tonemaps it
//! to the swap chain. Resizing rebuilds the swap chain and the offscreen
//! targets in place.

mod config;
mod renderer;
mod scene;
mod window;

use std::time::Instant;

use config::{SandboxConfig, CONFIG_PATH};
use renderer::Renderer;
use window::Window;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting PBR sandbox");
    let config = SandboxConfig::load_or_default(CONFIG_PATH)?;

    let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
    let mut renderer = Renderer::new(&config, &window)?;

    let start = Instant::now();
    let mut frames = 0u64;
    while !window.should_close() {
        let events = window.poll();
        if events.close_requested {
            break;
        }
        if events.resized {
            renderer.request_reinit();
            window.wait_while_minimized();
        }

        if let Err(e) = renderer.render_frame(window.framebuffer_size(), start.elapsed().as_secs_f32()) {
            log::error!("Frame {} failed: {}", frames, e);
            return Err(e.into());
        }
        frames += 1;
    }

    let elapsed = start.elapsed().as_secs_f32();
    log::info!(
        "Rendered {} frames in {:.1}s ({:.1} fps)",
        frames,
        elapsed,
        frames as f32 / elapsed.max(f32::EPSILON)
    );
    renderer.finish()?;
    Ok(())
}
