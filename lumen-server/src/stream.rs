//! multipart/x-mixed-replace (MJPEG) responses

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::{BufMut, Bytes, BytesMut};
use lumen_eye::RoomStreamWorker;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};

pub const BOUNDARY: &str = "frame";

/// How often a viewer polls its worker for a newer frame
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One multipart part wrapping a JPEG image
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Parts for every new frame `worker` publishes; ends when the worker stops.
///
/// Each viewer polls independently, so any number of clients can watch the
/// same room.
pub fn live_frames(worker: Arc<RoomStreamWorker>) -> impl Stream<Item = Result<Bytes, Infallible>> {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let watched = worker.clone();
    let mut last_sequence: Option<u64> = None;
    IntervalStream::new(interval)
        .take_while(move |_| watched.is_running())
        .filter_map(move |_| {
            let frame = worker.latest_frame()?;
            if last_sequence == Some(frame.sequence) {
                return None;
            }
            last_sequence = Some(frame.sequence);
            Some(Ok(mjpeg_part(&frame.jpeg)))
        })
}

/// A stream holding a single placeholder part
pub fn single_frame(jpeg: Bytes) -> impl Stream<Item = Result<Bytes, Infallible>> {
    tokio_stream::once(Ok(mjpeg_part(&jpeg)))
}

pub fn mjpeg_response<S>(parts: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_framing() {
        let part = mjpeg_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let head = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n";
        assert!(part.starts_with(head));
        assert_eq!(&part[head.len()..], &[0xFF, 0xD8, 0xFF, 0xD9, b'\r', b'\n']);
    }

    #[tokio::test]
    async fn test_single_frame_yields_once() {
        let mut parts = single_frame(Bytes::from_static(b"jpeg"));
        let first = parts.next().await.unwrap().unwrap();
        assert!(first.ends_with(b"jpeg\r\n"));
        assert!(parts.next().await.is_none());
    }
}
