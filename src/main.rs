mod cli;
mod live;
mod logging;

use pinchgrab::*;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
