//! Binary entry point for the Plaza world server.

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lib_plaza::init().await
}
