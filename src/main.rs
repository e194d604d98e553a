//! atelier-web: HTTP and WebSocket server over the atelier data layer.

#[tokio::main]
async fn main() {
    if let Err(e) = atelier::web::run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
