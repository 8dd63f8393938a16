mod actions;
mod cli;
mod config;
mod dispatch;
mod error;
mod geometry;
mod gestures;
mod hand;
mod logging;
mod motion;
mod pipeline;
mod source;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
