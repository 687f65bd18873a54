//! Live updates over a real WebSocket

use crate::support::test_config;
use futures_util::{SinkExt, Stream, StreamExt};
use momentum_radar::app::App;
use momentum_radar::broadcast::{server, ServerMessage};
use momentum_radar::worker::CycleKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

async fn next_message<S>(ws: &mut S) -> ServerMessage
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("read failed");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_subscriber_receives_top_n_and_coin_updates() {
    let app = App::build(test_config()).unwrap();
    app.orchestrator.run_cycle(CycleKind::Full).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(server::serve(
        listener,
        Arc::clone(&app.broadcast),
        shutdown_rx,
    ));

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
        .await
        .unwrap();
    ws.send(Message::Text(
        r#"{"type":"subscribe","channel":"coin:btc"}"#.to_string(),
    ))
    .await
    .unwrap();
    assert_eq!(
        next_message(&mut ws).await,
        ServerMessage::Subscribed {
            channel: "coin:BTC".to_string()
        }
    );

    let report = app.broadcast.tick().await.unwrap();
    assert_eq!(report.changed, app.config.broadcast.top_n.min(40));
    assert_eq!(report.delivered, 2);

    let mut channels = Vec::new();
    for _ in 0..2 {
        if let ServerMessage::Update { channel, data, .. } = next_message(&mut ws).await {
            if channel == "coin:BTC" {
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].symbol, "BTC");
            }
            channels.push(channel);
        }
    }
    channels.sort();
    assert_eq!(channels, vec!["coin:BTC", "top-n"]);

    // Nothing moved since the last push
    assert_eq!(app.broadcast.tick().await.unwrap().changed, 0);

    shutdown_tx.send(true).unwrap();
    server.await.unwrap();
}
