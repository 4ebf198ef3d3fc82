use std::thread;

use autofetch_core::CancelFlag;
use tracing::warn;

/// Exit status after a second Ctrl-C (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SignalAction {
    /// Let the current address finish, then stop.
    Cancel,
    Exit,
}

fn action_for(received: u32) -> SignalAction {
    if received <= 1 {
        SignalAction::Cancel
    } else {
        SignalAction::Exit
    }
}

/// Trip `cancel` on the first Ctrl-C; the loop notices at its next
/// checkpoint. The handler stays registered for the whole process, so a
/// second Ctrl-C exits immediately with status 130.
pub fn install(cancel: CancelFlag) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;
    thread::Builder::new()
        .name("autofetch-ctrl-c".into())
        .spawn(move || runtime.block_on(listen(cancel)))?;
    Ok(())
}

async fn listen(cancel: CancelFlag) {
    let mut received = 0u32;
    loop {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "autofetch::cli", error = %err, "listening for Ctrl-C failed");
            return;
        }
        received = received.saturating_add(1);
        match action_for(received) {
            SignalAction::Cancel => {
                warn!(target: "autofetch::cli", "interrupt received; finishing current address (Ctrl-C again to quit)");
                cancel.cancel();
            }
            SignalAction::Exit => {
                warn!(target: "autofetch::cli", "second interrupt; exiting");
                std::process::exit(EXIT_INTERRUPTED);
            }
        }
    }
}
