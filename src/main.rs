#[tokio::main]
async fn main() {
    chatterd::server::run().await;
}
