use scrivener::cli::CLI;
use scrivener::common::exception::WriterError;

#[tokio::main]
async fn main() -> Result<(), WriterError> {
    let mut cli = CLI::new()?;
    cli.run().await
}
