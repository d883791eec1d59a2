use std::error::Error;
use weak_scaling_plot::render_weak_scaling;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    render_weak_scaling("sequential_result.pdf")?;
    Ok(())
}
