use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use console::Term;

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C sets the engine's pause flag so the run stops at the
/// next batch boundary after a checkpoint save. A second Ctrl+C force
/// quits.
pub(crate) fn setup_shutdown_handler(pause: Arc<AtomicBool>) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing the current batch...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing the current batch");
        }

        pause.store(true, Ordering::SeqCst);

        // Second Ctrl+C force quits
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install second Ctrl+C handler");

        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(130);
    });
}
