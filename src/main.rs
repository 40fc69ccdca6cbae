pub mod app;
pub mod renderer;

use color_eyre::Result;
use app::App;
use renderer::config::RenderConfig;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let app = App::new(RenderConfig::default());
    app.run()?;

    Ok(())
}
