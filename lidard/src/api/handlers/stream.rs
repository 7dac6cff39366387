//! WebSocket scan stream
//!
//! Each connection gets its own subscription. A slow client only ever
//! backs up its own queue; the connection task is the consumer side.

use crate::api::AppState;
use crate::manager::{LidarManager, SubscriberHandle};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use lidar_core::api::StreamMessage;
use lidar_core::Scan;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stream completed scans as `{"type": "lidar_scan", "data": {...}}`.
///
/// # Endpoint
///
/// `GET /api/v0/ws/scan` (WebSocket upgrade)
pub(crate) async fn ws_scan(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    debug!("Request: GET /api/v0/ws/scan");
    let manager = state.manager.clone();
    ws.on_upgrade(move |socket| stream_scans(socket, manager))
}

async fn stream_scans(mut socket: WebSocket, manager: Arc<LidarManager>) {
    let subscription = manager.subscribe();
    info!("Stream client attached as subscriber {}", subscription.id());

    loop {
        tokio::select! {
            scan = subscription.recv() => {
                let Some(scan) = scan else {
                    debug!("Subscription {} closed", subscription.id());
                    break;
                };
                if !send_scan(&mut socket, &scan).await {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("Stream client error: {}", e);
                    break;
                }
                // Client messages carry no meaning on this stream
                Some(Ok(_)) => {}
            },
        }
    }

    detach(subscription);
}

/// Returns false once the client is gone
async fn send_scan(socket: &mut WebSocket, scan: &Scan) -> bool {
    let text = match serde_json::to_string(&StreamMessage::LidarScan(scan)) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize scan: {}", e);
            return true;
        }
    };

    match socket.send(Message::Text(text)).await {
        Ok(()) => true,
        Err(e) => {
            debug!("Stream client went away: {}", e);
            false
        }
    }
}

fn detach(subscription: SubscriberHandle) {
    debug!(
        "Stream client for subscriber {} disconnected ({} scans dropped)",
        subscription.id(),
        subscription.dropped()
    );
}

#[cfg(test)]
mod tests {
    use crate::api::handlers::test_utils::mock_app;
    use crate::manager::LidarManager;
    use futures_util::{SinkExt, StreamExt};
    use lidar_core::{Sample, Scan};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    async fn wait_for_subscribers(manager: &LidarManager, wanted: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.hub().subscriber_count() != wanted {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("subscriber count never reached {}", wanted));
    }

    #[tokio::test]
    async fn test_ws_delivers_published_scans_then_detaches() {
        let (app, manager) = mock_app();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let (mut ws, _) = connect_async(format!("ws://{}/api/v0/ws/scan", addr))
            .await
            .unwrap();
        wait_for_subscribers(&manager, 1).await;

        let hub = manager.hub();
        hub.publish(Arc::new(Scan::with_timestamp(
            1700000000.25,
            vec![Sample::new(0.0, 1000.0, 40), Sample::new(90.5, 0.0, 0)],
        )));
        hub.publish(Arc::new(Scan::with_timestamp(1700000000.5, vec![])));

        let mut frames = Vec::new();
        while frames.len() < 2 {
            let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = message {
                frames.push(serde_json::from_str::<Value>(&text).unwrap());
            }
        }

        assert_eq!(frames[0]["type"], "lidar_scan");
        assert_eq!(frames[0]["data"]["timestamp"], 1700000000.25);
        let points = frames[0]["data"]["points"].as_array().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0]["distance"], 1000.0);
        assert_eq!(points[1]["angle"], 90.5);
        assert_eq!(points[1]["intensity"], 0);

        assert_eq!(frames[1]["type"], "lidar_scan");
        assert_eq!(frames[1]["data"]["timestamp"], 1700000000.5);
        assert!(frames[1]["data"]["points"].as_array().unwrap().is_empty());

        ws.close(None).await.unwrap();
        wait_for_subscribers(&manager, 0).await;
    }

    #[tokio::test]
    async fn test_ws_dropped_connection_unsubscribes() {
        let (app, manager) = mock_app();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let url = format!("ws://{}/api/v0/ws/scan", addr);
        let (first, _) = connect_async(url.as_str()).await.unwrap();
        let (mut second, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_subscribers(&manager, 2).await;

        // No close handshake: the socket just goes away
        drop(first);
        wait_for_subscribers(&manager, 1).await;

        manager
            .hub()
            .publish(Arc::new(Scan::with_timestamp(3.0, vec![Sample::new(1.0, 2.0, 3)])));
        let message = tokio::time::timeout(Duration::from_secs(5), second.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let json: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
        assert_eq!(json["data"]["timestamp"], 3.0);

        second.send(Message::Close(None)).await.unwrap();
        wait_for_subscribers(&manager, 0).await;
    }
}
