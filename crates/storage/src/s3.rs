use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::constants::{DEFAULT_BUCKET, DEFAULT_REGION, PART_SIZE};
use crate::error::{StorageError, StorageResult};
use crate::{ChunkStream, ObjectStore, ObjectStream};

/// MinIO / S3 coordinates (`[minio]` section of the server config)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// `host:port`, or a full URL when it carries a scheme
    pub endpoint: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl S3Config {
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            let scheme = if self.ssl { "https" } else { "http" };
            format!("{}://{}", scheme, self.endpoint)
        }
    }
}

fn s3_error<E>(operation: &str, key: &str, err: E) -> StorageError
where
    E: std::error::Error,
{
    StorageError::S3(format!("{} {}: {}", operation, key, DisplayErrorContext(err)))
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket_name: String,
}

impl S3ObjectStore {
    /// Build a path-style client with static credentials
    pub async fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.clone(),
            None,
            None,
            "keeper-config",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        info!(
            "S3 client initialized for {} (bucket {})",
            config.endpoint_url(),
            config.bucket
        );

        Self {
            client: Client::from_conf(s3_config),
            bucket_name: config.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket_name
    }

    /// Create the bucket when it does not exist yet
    pub async fn ensure_bucket(&self) -> StorageResult<()> {
        match self.client.head_bucket().bucket(&self.bucket_name).send().await {
            Ok(_) => return Ok(()),
            Err(e) => {
                let service_error = e.into_service_error();
                if !service_error.is_not_found() {
                    return Err(s3_error("head_bucket", &self.bucket_name, service_error));
                }
            }
        }

        match self.client.create_bucket().bucket(&self.bucket_name).send().await {
            Ok(_) => {
                info!("Created bucket {}", self.bucket_name);
                Ok(())
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_bucket_already_owned_by_you() {
                    Ok(())
                } else {
                    Err(s3_error("create_bucket", &self.bucket_name, service_error))
                }
            }
        }
    }

    async fn put_single(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                error!("S3 PUT failed - Bucket: {}, Key: {}", self.bucket_name, key);
                s3_error("put_object", key, e)
            })?;
        Ok(())
    }

    async fn start_multipart(
        &self,
        key: &str,
        content_type: &str,
    ) -> StorageResult<MultipartUpload> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| s3_error("create_multipart_upload", key, e))?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| StorageError::S3(format!("no upload id returned for {}", key)))?
            .to_string();

        debug!("Started multipart upload {} for {}", upload_id, key);
        Ok(MultipartUpload {
            client: self.client.clone(),
            bucket: self.bucket_name.clone(),
            key: key.to_string(),
            upload_id,
            parts: Vec::new(),
            completed: false,
        })
    }
}

/// An open multipart upload. Aborted on drop unless completed, so a failed
/// body or a cancelled request leaves no parts billed in the bucket.
struct MultipartUpload {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    parts: Vec<CompletedPart>,
    completed: bool,
}

impl MultipartUpload {
    async fn upload_part(&mut self, data: Bytes) -> StorageResult<()> {
        let part_number = self.parts.len() as i32 + 1;
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| s3_error("upload_part", &self.key, e))?;

        self.parts.push(
            CompletedPart::builder()
                .set_e_tag(output.e_tag().map(str::to_string))
                .part_number(part_number)
                .build(),
        );
        Ok(())
    }

    async fn complete(mut self) -> StorageResult<()> {
        let parts = CompletedMultipartUpload::builder()
            .set_parts(Some(std::mem::take(&mut self.parts)))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(parts)
            .send()
            .await
            .map_err(|e| s3_error("complete_multipart_upload", &self.key, e))?;

        self.completed = true;
        Ok(())
    }
}

impl Drop for MultipartUpload {
    fn drop(&mut self) {
        if self.completed {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to abort multipart upload {} for {}", self.upload_id, self.key);
            return;
        };

        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = std::mem::take(&mut self.key);
        let upload_id = std::mem::take(&mut self.upload_id);
        runtime.spawn(async move {
            match client
                .abort_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                Ok(_) => debug!("Aborted multipart upload {} for {}", upload_id, key),
                Err(e) => warn!(
                    "Failed to abort multipart upload {} for {}: {}",
                    upload_id,
                    key,
                    DisplayErrorContext(e)
                ),
            }
        });
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    /// Memory per upload is bounded by one part: S3 rejects multipart parts
    /// under 5 MiB (except the last), so chunks accumulate until a full
    /// [`PART_SIZE`] part is ready. Bodies smaller than one part go up as a
    /// single `PutObject`.
    async fn put(
        &self,
        handle: &str,
        mut body: ChunkStream,
        content_type: &str,
    ) -> StorageResult<u64> {
        debug!("Writing to S3 bucket {} with key: {}", self.bucket_name, handle);

        let mut buffer = BytesMut::with_capacity(PART_SIZE);
        let mut upload: Option<MultipartUpload> = None;
        let mut total: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(StorageError::Body)?;
            total += chunk.len() as u64;
            buffer.extend_from_slice(&chunk);

            while buffer.len() >= PART_SIZE {
                let part = buffer.split_to(PART_SIZE).freeze();
                let active = match upload.take() {
                    Some(active) => active,
                    None => self.start_multipart(handle, content_type).await?,
                };
                upload.insert(active).upload_part(part).await?;
            }
        }

        match upload {
            None => self.put_single(handle, buffer.freeze(), content_type).await?,
            Some(mut active) => {
                if !buffer.is_empty() {
                    active.upload_part(buffer.freeze()).await?;
                }
                let parts = active.parts.len();
                active.complete().await?;
                debug!("Completed multipart upload of {} in {} parts", handle, parts);
            }
        }

        info!(
            "Successfully wrote {} bytes to S3 bucket {} with key: {}",
            total, self.bucket_name, handle
        );
        Ok(total)
    }

    async fn get(&self, handle: &str) -> StorageResult<ObjectStream> {
        debug!("Reading from S3 bucket {} with key: {}", self.bucket_name, handle);

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(handle)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Err(StorageError::NotFound(handle.to_string()));
                }
                error!("S3 GET failed - Bucket: {}, Key: {}", self.bucket_name, handle);
                return Err(s3_error("get_object", handle, service_error));
            }
        };

        let key = handle.to_string();
        let stream = futures::stream::try_unfold(output.body, move |mut body| {
            let key = key.clone();
            async move {
                match body.try_next().await {
                    Ok(Some(bytes)) => Ok(Some((bytes, body))),
                    Ok(None) => Ok(None),
                    Err(e) => Err(s3_error("read body", &key, e)),
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn delete(&self, handle: &str) -> StorageResult<()> {
        debug!("Deleting from S3 bucket {} with key: {}", self.bucket_name, handle);

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(handle)
            .send()
            .await
            .map_err(|e| s3_error("delete_object", handle, e))?;

        info!(
            "Successfully deleted from S3 bucket {} with key: {}",
            self.bucket_name, handle
        );
        Ok(())
    }

    async fn exists(&self, handle: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(handle)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(s3_error("head_object", handle, service_error))
                }
            }
        }
    }
}
