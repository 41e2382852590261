//! TCP server task for the debug stream.

use crate::snapshot::GridSnapshot;
use crate::wire::encode_frame;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Serve snapshots to one client at a time.
///
/// While no client is connected, incoming snapshots are drained and
/// dropped so a late viewer starts from a current frame. A write failure
/// logs the stream error, drops the client, and goes back to listening.
/// The task exits when the snapshot channel closes (pipeline shutdown).
pub async fn serve(listener: TcpListener, mut rx: mpsc::Receiver<GridSnapshot>) {
    loop {
        let (mut socket, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(target: "stream.net", %err, "accept_failed");
                    continue;
                }
            },
            received = rx.recv() => {
                if received.is_none() {
                    return;
                }
                continue; // no client yet: frame dropped
            }
        };
        info!(target: "stream.net", %peer, "client_connected");

        loop {
            let Some(snapshot) = rx.recv().await else {
                return; // pipeline shut down
            };
            let frame = match encode_frame(&snapshot) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(target: "stream.net", %err, "encode_failed");
                    continue;
                }
            };
            if let Err(err) = socket.write_all(&frame).await {
                warn!(target: "stream.net", %err, "client_send_failed");
                break; // back to listening
            }
        }
        info!(target: "stream.net", %peer, "client_dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::build_snapshot;
    use crate::wire::decode_frame;
    use core_config::Config;
    use core_grid::OccupancyGrid;
    use tokio::io::AsyncReadExt;

    fn snapshot(timestamp: f64) -> GridSnapshot {
        let mut config = Config::default();
        config.grid.grid_size = 8;
        let grid = OccupancyGrid::new(&config);
        build_snapshot(&grid, None, 0, timestamp, [0.0; 3])
    }

    #[tokio::test]
    async fn client_receives_framed_snapshots() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel(4);
        let server = tokio::spawn(serve(listener, rx));

        // Keep publishing until the client has decoded a frame; frames sent
        // before the accept resolves are allowed to drop.
        let feeder = tokio::spawn(async move {
            let mut i = 0u64;
            loop {
                if tx.send(snapshot(i as f64)).await.is_err() {
                    break;
                }
                i += 1;
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        });

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut buf = vec![0u8; 64 * 1024];
        let mut read = 0usize;
        let decoded = loop {
            let n = client.read(&mut buf[read..]).await.unwrap();
            assert!(n > 0, "connection closed early");
            read += n;
            match decode_frame(&buf[..read]) {
                Ok((snap, _)) => break snap,
                Err(crate::StreamError::Truncated(_)) => continue,
                Err(err) => panic!("bad frame: {err}"),
            }
        };
        assert_eq!(decoded.grid_size, 8);

        feeder.abort();
        let _ = feeder.await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn frames_without_a_client_are_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = mpsc::channel(1);
        let server = tokio::spawn(serve(listener, rx));

        // Nobody connected: sends drain without blocking the sender.
        for i in 0..8 {
            tx.send(snapshot(i as f64)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        drop(tx);
        server.await.unwrap();
    }
}
