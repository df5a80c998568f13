use cambist::CambistError;
use cambist::config::fetch_config;
use cambist::websocket::{WsConfig, serve};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), CambistError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;

    let streams: Vec<String> = std::env::args().skip(1).collect();
    let streams: Vec<&str> = if streams.is_empty() {
        vec!["btcusdt@aggTrade"]
    } else {
        streams.iter().map(String::as_str).collect()
    };
    let ws_config = WsConfig::combined_stream(&app_config.stream.base_url, &streams);

    let (done, stop) = serve(
        &ws_config,
        &app_config.stream.settings,
        |frame| println!("{}", String::from_utf8_lossy(frame)),
        |err| error!("stream failed: {err}"),
    )
    .await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping stream");
            stop.stop();
            done.wait().await;
        }
        () = done.wait() => {}
    }

    Ok(())
}
