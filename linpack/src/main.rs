#[tokio::main]
async fn main() -> anyhow::Result<()> {
    linpack::run_cli().await
}
