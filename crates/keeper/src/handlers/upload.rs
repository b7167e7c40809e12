//! Frame discipline of `CreateItemStream`
//!
//! The first frame must carry the item info, every later frame a chunk of at
//! most `max_chunk_size` bytes. Chunks are handed to the object store as they
//! arrive; a violation fails the body, which aborts the upload.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use proto::create_item_stream_request::Data;
use proto::{CreateItemStreamRequest, ItemInfo};
use storage::{BoxError, ChunkStream};
use tonic::{Code, Status};

use crate::error::ServiceError;

#[derive(Debug, PartialEq)]
pub enum Frame {
    Info(ItemInfo),
    Chunk(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectInfo,
    ExpectChunks,
}

#[derive(Debug)]
pub struct UploadFrames {
    state: State,
    max_chunk_size: usize,
}

impl UploadFrames {
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            state: State::ExpectInfo,
            max_chunk_size,
        }
    }

    pub fn accept(&mut self, frame: CreateItemStreamRequest) -> Result<Frame, ServiceError> {
        match (self.state, frame.data) {
            (State::ExpectInfo, Some(Data::Info(info))) => {
                self.state = State::ExpectChunks;
                Ok(Frame::Info(info))
            }
            (State::ExpectInfo, _) => Err(ServiceError::InvalidInput(
                "first frame must carry item info".to_string(),
            )),
            (State::ExpectChunks, Some(Data::ChunkData(chunk))) => {
                if chunk.len() > self.max_chunk_size {
                    return Err(ServiceError::InvalidInput(format!(
                        "chunk of {} bytes exceeds the {} byte limit",
                        chunk.len(),
                        self.max_chunk_size
                    )));
                }
                Ok(Frame::Chunk(Bytes::from(chunk)))
            }
            (State::ExpectChunks, Some(Data::Info(_))) => Err(ServiceError::InvalidInput(
                "item info may only be sent in the first frame".to_string(),
            )),
            (State::ExpectChunks, None) => Err(ServiceError::InvalidInput(
                "frame carries no data".to_string(),
            )),
        }
    }
}

/// Error for a frame the transport failed to deliver. A frame over the
/// decode limit surfaces as `OutOfRange` and is the client's fault.
fn frame_error(status: Status) -> ServiceError {
    if status.code() == Code::OutOfRange {
        ServiceError::InvalidInput(format!(
            "frame exceeds the message size limit: {}",
            status.message()
        ))
    } else {
        ServiceError::Transport(status)
    }
}

/// Pull the leading info frame off `frames`
pub async fn read_info<S>(
    frames: &mut S,
    parser: &mut UploadFrames,
) -> Result<ItemInfo, ServiceError>
where
    S: Stream<Item = Result<CreateItemStreamRequest, Status>> + Unpin,
{
    let frame = match frames.next().await {
        Some(Ok(frame)) => frame,
        Some(Err(status)) => return Err(frame_error(status)),
        None => return Err(ServiceError::InvalidInput("empty upload stream".to_string())),
    };

    match parser.accept(frame)? {
        Frame::Info(info) => Ok(info),
        Frame::Chunk(_) => Err(ServiceError::InvalidInput(
            "first frame must carry item info".to_string(),
        )),
    }
}

/// Remaining frames as an object store body. Errors are boxed
/// `ServiceError`s so the caller can recover them.
pub fn into_chunks<S>(frames: S, mut parser: UploadFrames) -> ChunkStream
where
    S: Stream<Item = Result<CreateItemStreamRequest, Status>> + Send + 'static,
{
    frames
        .map(move |frame| -> Result<Bytes, BoxError> {
            let frame = frame.map_err(|status| Box::new(frame_error(status)) as BoxError)?;
            match parser.accept(frame) {
                Ok(Frame::Chunk(chunk)) => Ok(chunk),
                Ok(Frame::Info(_)) => Err(Box::new(ServiceError::InvalidInput(
                    "item info may only be sent in the first frame".to_string(),
                ))),
                Err(e) => Err(Box::new(e)),
            }
        })
        .boxed()
}
