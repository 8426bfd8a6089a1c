//! # collaborators::price_ws
//!
//! **Price Feed client**: subscribes to the quote stream over WebSocket and
//! takes the first quote.
//!
//! ## Stream Contract
//! ```text
//! → { "action": "subscribe", "shares": ["AAPL"] }
//! ← { "shares": [ { "share": "AAPL", "price": 187.42 } ] }   (repeated)
//! ```
//! Only the first frame carrying a usable price is consumed; the socket is
//! then closed.  The whole exchange is bounded by `timeout`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use super::PriceFeed;
use crate::decimal;
use crate::error::CollaboratorError;
use crate::models::Quote;

#[derive(Debug, Deserialize)]
struct QuoteFrame {
    shares: Vec<ShareQuote>,
}

#[derive(Debug, Deserialize)]
struct ShareQuote {
    share: String,
    price: f64,
}

/// Picks the quote for one of `instruments` from a frame, if present.
fn pick_quote(frame: QuoteFrame, instruments: &[String]) -> Option<Result<Quote, CollaboratorError>> {
    let share = frame
        .shares
        .into_iter()
        .find(|q| instruments.iter().any(|name| name == &q.share))?;

    Some(
        decimal::money(share.price)
            .map(|price| Quote { instrument: share.share, price })
            .map_err(|e| CollaboratorError::Unavailable(format!("malformed quote: {e}"))),
    )
}

pub struct WsPriceFeed {
    url:     String,
    timeout: Duration,
}

impl WsPriceFeed {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self { url: url.to_string(), timeout }
    }

    async fn first_quote(&self, instruments: &[String]) -> Result<Quote, CollaboratorError> {
        let (mut socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("price feed connect: {e}")))?;

        let request = json!({ "action": "subscribe", "shares": instruments }).to_string();
        socket
            .send(Message::Text(request))
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("price feed subscribe: {e}")))?;

        let quote = loop {
            let message = match socket.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    return Err(CollaboratorError::Unavailable(format!("price feed recv: {e}")));
                }
                None => {
                    return Err(CollaboratorError::Unavailable("price feed closed the stream".into()));
                }
            };

            match message {
                Message::Text(text) => match serde_json::from_str::<QuoteFrame>(&text) {
                    Ok(frame) => {
                        if let Some(result) = pick_quote(frame, instruments) {
                            break result?;
                        }
                    }
                    Err(e) => debug!(error = %e, "Ignoring non-quote frame"),
                },
                Message::Ping(data) => {
                    let _ = socket.send(Message::Pong(data)).await;
                }
                Message::Close(_) => {
                    return Err(CollaboratorError::Unavailable("price feed closed the stream".into()));
                }
                _ => {}
            }
        };

        if let Err(e) = socket.close(None).await {
            debug!(error = %e, "Price feed close handshake failed");
        }
        Ok(quote)
    }
}

#[async_trait]
impl PriceFeed for WsPriceFeed {
    async fn subscribe(&self, instruments: &[String]) -> Result<Quote, CollaboratorError> {
        match tokio::time::timeout(self.timeout, self.first_quote(instruments)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(instruments = ?instruments, timeout = ?self.timeout, "No quote before timeout");
                Err(CollaboratorError::Timeout(self.timeout))
            }
        }
    }
}
