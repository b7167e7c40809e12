use futures::{Stream, StreamExt};
use proto::get_item_stream_response::Data as DownloadData;
use proto::keeper_service_server::KeeperService as KeeperRpc;
use proto::*;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use storage::ObjectStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::debug;

use super::observe;
use super::upload::{self, UploadFrames};
use crate::error::ServiceError;
use crate::interceptor::caller;
use crate::services::KeeperService;

pub struct KeeperServiceImpl {
    service: Arc<KeeperService>,
    max_chunk_size: usize,
}

impl KeeperServiceImpl {
    pub fn new(service: Arc<KeeperService>, max_chunk_size: usize) -> Self {
        Self {
            service,
            max_chunk_size,
        }
    }
}

fn owner<T>(request: &Request<T>) -> Result<i64, ServiceError> {
    caller(request)
        .map(|info| info.user_id)
        .map_err(ServiceError::Transport)
}

/// Content frame first, then the object re-cut into chunks of at most
/// `max_chunk_size` bytes
fn download_frames(
    content: Vec<u8>,
    mut body: ObjectStream,
    max_chunk_size: usize,
) -> impl Stream<Item = Result<GetItemStreamResponse, Status>> + Send + 'static {
    async_stream::stream! {
        yield Ok(GetItemStreamResponse {
            data: Some(DownloadData::Content(content)),
        });

        while let Some(part) = body.next().await {
            match part {
                Ok(mut bytes) => {
                    while !bytes.is_empty() {
                        let piece = bytes.split_to(bytes.len().min(max_chunk_size));
                        yield Ok(GetItemStreamResponse {
                            data: Some(DownloadData::ChunkData(piece.to_vec())),
                        });
                    }
                }
                Err(e) => {
                    yield Err(Status::from(ServiceError::storage("get_item_stream", e)));
                    break;
                }
            }
        }
    }
}

#[tonic::async_trait]
impl KeeperRpc for KeeperServiceImpl {
    async fn create_item(
        &self,
        request: Request<CreateItemRequest>,
    ) -> Result<Response<CreateItemResponse>, Status> {
        let started = Instant::now();
        let result = async {
            let owner = owner(&request)?;
            let req = request.into_inner();
            let item = self.service.create_item(owner, &req.name, req.content).await?;
            Ok::<_, ServiceError>(CreateItemResponse {
                name: item.name,
                version: item.version.to_string(),
            })
        }
        .await;

        observe("CreateItem", started, result)
    }

    async fn update_item(
        &self,
        request: Request<UpdateItemRequest>,
    ) -> Result<Response<UpdateItemResponse>, Status> {
        let started = Instant::now();
        let result = async {
            let owner = owner(&request)?;
            let req = request.into_inner();
            let item = self.service.update_item(owner, &req.name, req.content).await?;
            Ok::<_, ServiceError>(UpdateItemResponse {
                name: item.name,
                version: item.version.to_string(),
            })
        }
        .await;

        observe("UpdateItem", started, result)
    }

    async fn delete_item(
        &self,
        request: Request<DeleteItemRequest>,
    ) -> Result<Response<DeleteItemResponse>, Status> {
        let started = Instant::now();
        let result = async {
            let owner = owner(&request)?;
            let name = request.into_inner().name;
            self.service.delete_item(owner, &name).await?;
            Ok::<_, ServiceError>(DeleteItemResponse { name })
        }
        .await;

        observe("DeleteItem", started, result)
    }

    async fn get_item(
        &self,
        request: Request<GetItemRequest>,
    ) -> Result<Response<GetItemResponse>, Status> {
        let started = Instant::now();
        let result = async {
            let owner = owner(&request)?;
            let name = request.into_inner().name;
            let item = self.service.get_item(owner, &name).await?;
            Ok::<_, ServiceError>(GetItemResponse {
                name: item.name,
                content: item.content,
                version: item.version.to_string(),
            })
        }
        .await;

        observe("GetItem", started, result)
    }

    async fn list_items(
        &self,
        request: Request<ListItemsRequest>,
    ) -> Result<Response<ListItemsResponse>, Status> {
        let started = Instant::now();
        let result = async {
            let owner = owner(&request)?;
            let items = self.service.list_items(owner).await?;
            debug!("Listing {} items for user {}", items.len(), owner);
            Ok::<_, ServiceError>(ListItemsResponse {
                items: items
                    .into_iter()
                    .map(|item| Item {
                        name: item.name,
                        content: item.content,
                        version: item.version.to_string(),
                    })
                    .collect(),
            })
        }
        .await;

        observe("ListItems", started, result)
    }

    async fn create_item_stream(
        &self,
        request: Request<Streaming<CreateItemStreamRequest>>,
    ) -> Result<Response<CreateItemStreamResponse>, Status> {
        let started = Instant::now();
        let result = async {
            let owner = owner(&request)?;
            let mut frames = request.into_inner();
            let mut parser = UploadFrames::new(self.max_chunk_size);

            let info = upload::read_info(&mut frames, &mut parser).await?;
            let chunks = upload::into_chunks(frames, parser);

            let item = self
                .service
                .create_item_stream(owner, &info.name, info.content, chunks)
                .await?;
            Ok::<_, ServiceError>(CreateItemStreamResponse {
                name: item.name,
                version: item.version.to_string(),
            })
        }
        .await;

        observe("CreateItemStream", started, result)
    }

    type GetItemStreamStream =
        Pin<Box<dyn Stream<Item = Result<GetItemStreamResponse, Status>> + Send + 'static>>;

    async fn get_item_stream(
        &self,
        request: Request<GetItemStreamRequest>,
    ) -> Result<Response<Self::GetItemStreamStream>, Status> {
        let started = Instant::now();
        let max_chunk_size = self.max_chunk_size;
        let result = async {
            let owner = owner(&request)?;
            let name = request.into_inner().name;
            let (content, body) = self.service.get_file_stream(owner, &name).await?;
            let frames: Self::GetItemStreamStream =
                Box::pin(download_frames(content, body, max_chunk_size));
            Ok::<_, ServiceError>(frames)
        }
        .await;

        observe("GetItemStream", started, result)
    }
}
