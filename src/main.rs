use anyhow::Result;
use clap::Parser;

use cutcell::pipeline::Pipeline;
use cutcell::settings::{self, CliArgs};

fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config = settings::load_config(&args)?;

    if config.echo_level > 0 {
        println!("{config}");
    }

    let mut pipeline = Pipeline::from_settings(config)?;
    pipeline.run()?;

    Ok(())
}
