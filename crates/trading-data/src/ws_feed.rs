//! WebSocket market feed.
//!
//! Subscription frame:
//! ```json
//! {"action": "subscribe", "tokens": ["3045", "1594"]}
//! ```
//! Tick frame:
//! ```json
//! {"token": "3045", "ltp": 612.35, "ts": 1709264700000, "vol": 120}
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use trading_core::error::FeedError;
use trading_core::traits::{FeedEvent, MarketFeed};
use trading_core::types::{Instrument, PriceTick};

/// WebSocket endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WsFeedConfig {
    pub url: String,
    pub ping_interval_secs: u64,
}

impl Default for WsFeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://feed.example-broker.in/v1/ticks".to_string(),
            ping_interval_secs: 20,
        }
    }
}

#[derive(Debug, Serialize)]
struct SubscribeFrame<'a> {
    action: &'static str,
    tokens: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TickFrame {
    token: String,
    ltp: f64,
    ts: i64,
    #[serde(default)]
    vol: f64,
}

/// Decode a text frame into a tick for a known token.
fn decode_tick(text: &str, symbols: &HashMap<String, String>) -> Option<PriceTick> {
    let frame: TickFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            debug!(frame = %text, "Ignoring non-tick frame");
            return None;
        }
    };
    let symbol = symbols.get(&frame.token)?;
    Some(PriceTick::new(symbol.clone(), frame.ltp, frame.ts, frame.vol))
}

/// Market feed over a single WebSocket connection.
pub struct WsMarketFeed {
    config: WsFeedConfig,
    /// token -> symbol
    symbols: Arc<RwLock<HashMap<String, String>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WsMarketFeed {
    pub fn new(config: WsFeedConfig) -> Self {
        Self {
            config,
            symbols: Arc::new(RwLock::new(HashMap::new())),
            outbound: Mutex::new(None),
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MarketFeed for WsMarketFeed {
    async fn connect(&self, sink: mpsc::Sender<FeedEvent>) -> Result<(), FeedError> {
        let (stream, _response) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| FeedError::Connection(e.to_string()))?;
        info!(url = %self.config.url, "WebSocket connected");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let symbols = self.symbols.clone();
        let ping_every = Duration::from_secs(self.config.ping_interval_secs.max(1));
        let handle = tokio::spawn(run_connection(stream, out_rx, sink, symbols, ping_every));

        if let Some(old) = self.task.lock().await.replace(handle) {
            old.abort();
        }
        *self.outbound.lock().await = Some(out_tx);
        Ok(())
    }

    async fn subscribe(&self, instruments: &[Instrument]) -> Result<(), FeedError> {
        {
            let mut symbols = self.symbols.write().unwrap_or_else(PoisonError::into_inner);
            for instrument in instruments {
                symbols.insert(instrument.token.clone(), instrument.symbol.clone());
            }
        }

        let frame = SubscribeFrame {
            action: "subscribe",
            tokens: instruments.iter().map(|i| i.token.as_str()).collect(),
        };
        let text = serde_json::to_string(&frame).map_err(|e| FeedError::Protocol(e.to_string()))?;

        let outbound = self.outbound.lock().await;
        let tx = outbound.as_ref().ok_or(FeedError::NotConnected)?;
        tx.send(Message::Text(text))
            .map_err(|_| FeedError::Subscription("connection closed".to_string()))
    }

    async fn disconnect(&self) -> Result<(), FeedError> {
        // Dropping the sender closes the socket from the connection task
        self.outbound.lock().await.take();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

async fn run_connection<S>(
    stream: tokio_tungstenite::WebSocketStream<S>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    sink: mpsc::Sender<FeedEvent>,
    symbols: Arc<RwLock<HashMap<String, String>>>,
    ping_every: Duration,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = stream.split();
    let mut ping = tokio::time::interval(ping_every);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let reason = loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(msg) => {
                    if let Err(e) = write.send(msg).await {
                        break e.to_string();
                    }
                }
                None => {
                    let _ = write.close().await;
                    debug!("WebSocket closed locally");
                    return;
                }
            },
            _ = ping.tick() => {
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    break e.to_string();
                }
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let tick = {
                        let symbols = symbols.read().unwrap_or_else(PoisonError::into_inner);
                        decode_tick(&text, &symbols)
                    };
                    if let Some(tick) = tick {
                        if sink.send(FeedEvent::Tick(tick)).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        break e.to_string();
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "closed by server".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            },
        }
    };

    warn!(reason = %reason, "WebSocket connection lost");
    let _ = sink.send(FeedEvent::Disconnected(reason)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn test_decode_tick() {
        let mut symbols = HashMap::new();
        symbols.insert("3045".to_string(), "SBIN".to_string());

        let tick = decode_tick(r#"{"token":"3045","ltp":612.35,"ts":1709264700000,"vol":120}"#, &symbols)
            .unwrap();
        assert_eq!(tick.symbol, "SBIN");
        assert_eq!(tick.price, 612.35);
        assert_eq!(tick.timestamp, 1_709_264_700_000);

        assert!(decode_tick(r#"{"token":"999","ltp":1.0,"ts":1}"#, &symbols).is_none());
        assert!(decode_tick(r#"{"status":"subscribed"}"#, &symbols).is_none());
    }

    #[tokio::test]
    async fn test_subscribe_and_receive_ticks() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();
            let subscribe = loop {
                match ws.next().await.unwrap().unwrap() {
                    Message::Text(text) => break text,
                    _ => continue,
                }
            };
            ws.send(Message::Text(r#"{"token":"3045","ltp":611.0,"ts":1000,"vol":5}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
            subscribe
        });

        let feed = WsMarketFeed::new(WsFeedConfig {
            url: format!("ws://{}", addr),
            ping_interval_secs: 60,
        });
        let (tx, mut rx) = mpsc::channel(16);
        feed.connect(tx).await.unwrap();
        feed.subscribe(&[Instrument::new("SBIN", "NSE", "3045", "PSU_BANK")])
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            FeedEvent::Tick(tick) => {
                assert_eq!(tick.symbol, "SBIN");
                assert_eq!(tick.price, 611.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(rx.recv().await.unwrap(), FeedEvent::Disconnected(_)));

        let subscribe = server.await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&subscribe).unwrap();
        assert_eq!(json["action"], "subscribe");
        assert_eq!(json["tokens"][0], "3045");

        feed.disconnect().await.unwrap();
    }
}
