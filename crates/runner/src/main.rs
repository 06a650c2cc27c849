//! Kanko Runner - plays a short guided tour against the headless viewer.

mod run;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run::run().await
}
