use super::TransportLink;
use crate::error::TransportError;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the WebSocket once and pumps frames between the socket and `link`
/// until either side goes away. A failed attempt marks the link closed; there
/// is no retry. Aborting the task running this closes the socket.
pub async fn run(url: &Url, link: TransportLink) -> Result<(), TransportError> {
    let (ws, _) = match connect_async(url.as_str()).await {
        Ok(value) => value,
        Err(err) => {
            warn!("ws_connect_error: {url}: {err}");
            link.mark_closed();
            return Err(TransportError::Connect(err.to_string()));
        }
    };
    info!("ws_connected: {url}");
    link.mark_open();
    pump(ws, link).await;
    Ok(())
}

async fn pump(mut ws: Socket, link: TransportLink) {
    let TransportLink {
        ready,
        mut outbound,
        inbound,
    } = link;

    loop {
        tokio::select! {
            incoming = ws.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if inbound.send(text).is_err() {
                            debug!("ws_inbound_receiver_dropped");
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            if inbound.send(text).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!("ws_binary_frame_not_utf8: {err}"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!("ws_closed_by_peer: {frame:?}");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("ws_read_error: {err}");
                        break;
                    }
                    None => break,
                }
            }
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(err) = ws.send(Message::Text(frame)).await {
                            warn!("ws_write_error: {err}");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    ready.send_replace(super::ReadyState::Closed);
    let _ = ws.close(None).await;
}
