//! Demo harness for the console wrapper
//!
//! Runs an arbitrary executable under [`ConsoleWrapper`], mirrors its
//! captured output and error lines to the terminal, optionally feeds it
//! stdin lines, and waits for it to finish.

use std::path::PathBuf;

use clap::Parser;
use console_wrapper::{ConsoleWrapper, WrapperSettings, registry};
use tracing::info;

/// Run an executable under the console wrapper
#[derive(Parser)]
#[command(name = "wrapper-cli")]
struct Args {
    /// Path to the executable to wrap
    executable: PathBuf,

    /// Argument string passed to the executable on start
    #[arg(long)]
    args: Option<String>,

    /// Working directory for the child
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Lines to write to the child's stdin after start (repeatable)
    #[arg(long = "send")]
    send: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    smol::block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut settings = WrapperSettings::builder();
    if let Some(dir) = &args.working_dir {
        settings = settings.working_directory(dir);
    }
    let wrapper = ConsoleWrapper::new(&args.executable, settings.build())?;

    wrapper.on_output(|line| println!("{line}"));
    wrapper.on_error(|line| eprintln!("{line}"));
    wrapper.on_exited(|at| info!(%at, "child exited"));
    wrapper.on_killed(|| info!("child killed"));

    wrapper.execute(args.args.as_deref())?;
    info!(pid = ?wrapper.pid(), "child started");

    for line in &args.send {
        wrapper.write_to_console(line).await?;
    }

    wrapper.exited().wait().await;
    wrapper.dispose(false).await;

    // reap anything still registered before the host goes away
    registry::global().terminate_all();
    Ok(())
}
