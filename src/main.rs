#[tokio::main]
async fn main() {
    datahub_server::start_server().await;
}
