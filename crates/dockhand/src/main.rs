use anyhow::Result;
use clap::Parser;
use dockhand_core::errors::DockhandError;

mod cli;
mod ui;

#[tokio::main]
async fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    match parsed.dispatch().await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(err) => {
            if let Some(dockhand_error) = err.downcast_ref::<DockhandError>() {
                if let DockhandError::CommandFailed { tail_output, .. } = dockhand_error {
                    for line in tail_output {
                        eprintln!("  {}", line);
                    }
                }
                eprintln!("Error: {}", dockhand_error);
                std::process::exit(dockhand_error.exit_code());
            }

            // Anything else exits 1 through the default handler
            Err(err)
        }
    }
}
