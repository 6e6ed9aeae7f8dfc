//! Venue connectors: websocket lifecycle, inbound parsing, outbound routing
//!
//! One websocket connection per (venue, channel), each owned by a
//! dedicated worker thread running its own single-threaded I/O loop.
//! Reconnection is linear with a process-lifetime attempt counter; the
//! strategy learns about disconnects through `WsDisconnected` events.

pub mod market_data;
pub mod order_channel;
pub mod rest;
pub mod router;
pub mod state;
pub mod ws;

pub use market_data::MarketDataHandler;
pub use order_channel::{ChannelMessage, MessageSink, OrderChannelHandler};
pub use rest::RestClient;
pub use router::WsOrderRouter;
pub use state::{ReconnectDecision, ReconnectPolicy, WsState};
pub use ws::{VenueStream, WsClient, WsConfig, WsHandle};
