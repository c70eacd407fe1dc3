//! Command-line interface for the `skillhub` application.
//!
//! The binary is a thin shell; everything lives in `skillhub-app`.

fn main() -> anyhow::Result<()> {
    skillhub_app::run()
}
