#[tokio::main]
async fn main() {
    netwalk::start_server().await;
}
