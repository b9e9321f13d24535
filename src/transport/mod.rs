//! WebSocket transport between transcription clients and the recognition server.

pub mod connection;
pub mod server;
pub mod session;

pub use connection::{ConnectOptions, Connection, connect};
pub use server::{ServerEvent, TranscriptionServer};
pub use session::Session;

use crate::defaults;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;

/// Server handshake callback: accept the `binary` sub-protocol when offered.
pub fn negotiate_subprotocol(
    request: &Request,
    mut response: Response,
) -> std::result::Result<Response, ErrorResponse> {
    let offered = request
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|protocol| protocol.trim() == defaults::SUBPROTOCOL);

    if offered {
        response.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(defaults::SUBPROTOCOL),
        );
    }
    Ok(response)
}
