//! droidctl - remote control and UI introspection for Android devices
//!
//! Thin entry point; the command definitions and dispatch live in
//! `droidctl-cli`.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    droidctl_cli::run().await
}
