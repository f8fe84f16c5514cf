use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};
use uuid::Uuid;

use super::context::CallContext;
use super::ServiceConfig;
use crate::pb::upload_image_request::Data;
use crate::pb::{
    CreateLaptopRequest, CreateLaptopResponse, LaptopService, RateLaptopRequest,
    RateLaptopResponse, SearchLaptopRequest, SearchLaptopResponse, UploadImageRequest,
    UploadImageResponse,
};
use crate::store::{ImageStore, LaptopStore, RatingStore, StoreError};

/// Responses buffered ahead of a slow reader before the producer waits.
const STREAM_BUFFER: usize = 16;

/// gRPC handler for `LaptopService`, orchestrating the three stores.
///
/// Cheap to clone: every field is shared. Streaming handlers move a clone
/// into the task that drives the stream.
#[derive(Clone)]
pub struct LaptopServer {
    laptop_store: Arc<dyn LaptopStore>,
    image_store: Arc<dyn ImageStore>,
    rating_store: Arc<dyn RatingStore>,
    config: ServiceConfig,
}

impl LaptopServer {
    pub fn new(
        laptop_store: Arc<dyn LaptopStore>,
        image_store: Arc<dyn ImageStore>,
        rating_store: Arc<dyn RatingStore>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            laptop_store,
            image_store,
            rating_store,
            config,
        }
    }

    pub fn laptop_store(&self) -> &Arc<dyn LaptopStore> {
        &self.laptop_store
    }

    pub fn image_store(&self) -> &Arc<dyn ImageStore> {
        &self.image_store
    }

    pub fn rating_store(&self) -> &Arc<dyn RatingStore> {
        &self.rating_store
    }

    /// Loads the laptop an upload or rating refers to, failing with
    /// `NotFound` when it does not exist.
    fn require_laptop(&self, laptop_id: &str) -> Result<(), Status> {
        match self.laptop_store.find(laptop_id)? {
            Some(_) => Ok(()),
            None => {
                tracing::warn!(laptop_id, "laptop does not exist");
                Err(Status::not_found(format!(
                    "laptop {laptop_id} does not exist"
                )))
            }
        }
    }

    async fn receive_image(
        &self,
        mut stream: Streaming<UploadImageRequest>,
    ) -> Result<UploadImageResponse, Status> {
        let info = match stream.message().await {
            Ok(Some(UploadImageRequest {
                data: Some(Data::Info(info)),
            })) => info,
            Ok(Some(_)) => {
                return Err(Status::invalid_argument(
                    "first upload message must carry image info",
                ))
            }
            Ok(None) => {
                return Err(Status::invalid_argument(
                    "upload ended before image info was sent",
                ))
            }
            Err(status) => return Err(receive_failed("image info", status)),
        };
        tracing::info!(laptop_id = %info.laptop_id, image_type = %info.image_type, "receive an upload-image request");

        validate_image_type(&info.image_type)?;
        self.require_laptop(&info.laptop_id)?;

        let max = self.config.max_image_size;
        let mut image = Vec::new();
        loop {
            let chunk = match stream.message().await {
                Ok(Some(UploadImageRequest {
                    data: Some(Data::ChunkData(chunk)),
                })) => chunk,
                Ok(Some(_)) => {
                    return Err(Status::invalid_argument(
                        "expected chunk data after image info",
                    ))
                }
                Ok(None) => break,
                Err(status) => return Err(receive_failed("chunk data", status)),
            };

            if image.len() + chunk.len() > max {
                tracing::warn!(laptop_id = %info.laptop_id, max, "image is too large");
                return Err(Status::invalid_argument(format!(
                    "image is too large: exceeds {max} bytes"
                )));
            }
            image.extend_from_slice(&chunk);
            tracing::trace!(received = image.len(), "received chunk");
        }

        let size = u32::try_from(image.len())
            .map_err(|_| Status::invalid_argument("image size does not fit in u32"))?;
        let store = Arc::clone(&self.image_store);
        let laptop_id = info.laptop_id;
        let image_type = info.image_type;
        let id = tokio::task::spawn_blocking(move || store.save(&laptop_id, &image_type, &image))
            .await
            .map_err(|err| Status::internal(format!("image save task failed: {err}")))??;

        tracing::info!(image_id = %id, size, "saved image");
        Ok(UploadImageResponse { id, size })
    }

    async fn rate_loop<S>(
        &self,
        ctx: CallContext,
        mut stream: S,
        tx: &mpsc::Sender<Result<RateLaptopResponse, Status>>,
    ) -> Result<(), Status>
    where
        S: Stream<Item = Result<RateLaptopRequest, Status>> + Unpin,
    {
        loop {
            ctx.check(tx.is_closed())?;

            let request = match stream.next().await {
                Some(Ok(request)) => request,
                None => {
                    tracing::debug!("rating stream finished");
                    return Ok(());
                }
                Some(Err(status)) => return Err(receive_failed("rating", status)),
            };
            // The wait for this message may have outlived the caller.
            ctx.check(tx.is_closed())?;
            let RateLaptopRequest { laptop_id, score } = request;
            tracing::info!(laptop_id = %laptop_id, score, "receive a rate-laptop request");

            if !score.is_finite() || score < 0.0 {
                return Err(Status::invalid_argument(format!(
                    "score must be a non-negative number, got {score}"
                )));
            }
            self.require_laptop(&laptop_id)?;

            let rating = self.rating_store.add(&laptop_id, score)?;
            let response = RateLaptopResponse {
                laptop_id,
                rated_count: rating.count,
                average_score: rating.average(),
            };

            tx.send(Ok(response))
                .await
                .map_err(|_| Status::cancelled("rating response stream closed"))?;
        }
    }
}

#[tonic::async_trait]
impl LaptopService for LaptopServer {
    async fn create_laptop(
        &self,
        request: Request<CreateLaptopRequest>,
    ) -> Result<Response<CreateLaptopResponse>, Status> {
        CallContext::from_metadata(request.metadata()).check(false)?;

        let mut laptop = request
            .into_inner()
            .laptop
            .ok_or_else(|| Status::invalid_argument("laptop is required"))?;
        tracing::info!(laptop_id = %laptop.id, "receive a create-laptop request");

        // Ids are stored in hyphenated form so one UUID has one key.
        laptop.id = if laptop.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            Uuid::parse_str(&laptop.id)
                .map_err(|_| {
                    Status::invalid_argument(format!(
                        "laptop ID is not a valid UUID: {}",
                        laptop.id
                    ))
                })?
                .to_string()
        };

        self.laptop_store.save(&laptop).map_err(|err| {
            tracing::warn!(laptop_id = %laptop.id, error = %err, "cannot save laptop");
            Status::from(err)
        })?;

        tracing::info!(laptop_id = %laptop.id, "saved laptop");
        Ok(Response::new(CreateLaptopResponse { id: laptop.id }))
    }

    type SearchLaptopStream = ReceiverStream<Result<SearchLaptopResponse, Status>>;

    async fn search_laptop(
        &self,
        request: Request<SearchLaptopRequest>,
    ) -> Result<Response<Self::SearchLaptopStream>, Status> {
        let filter = request.into_inner().filter;
        tracing::info!(?filter, "receive a search-laptop request");

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let store = Arc::clone(&self.laptop_store);

        // The scan blocks on the bounded channel while the client is slow,
        // so it runs on the blocking pool.
        tokio::task::spawn_blocking(move || {
            let result = store.search(filter.as_ref(), &mut |laptop| {
                let laptop_id = laptop.id.clone();
                tx.blocking_send(Ok(SearchLaptopResponse {
                    laptop: Some(laptop),
                }))
                .map_err(|_| StoreError::Aborted("response stream closed".into()))?;
                tracing::debug!(laptop_id = %laptop_id, "sent laptop");
                Ok(())
            });

            if let Err(err) = result {
                tracing::warn!(error = %err, "search aborted");
                let _ = tx.blocking_send(Err(Status::from(err)));
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn upload_image(
        &self,
        request: Request<Streaming<UploadImageRequest>>,
    ) -> Result<Response<UploadImageResponse>, Status> {
        let response = self
            .receive_image(request.into_inner())
            .await
            .inspect_err(|status| tracing::warn!(%status, "upload-image failed"))?;
        Ok(Response::new(response))
    }

    type RateLaptopStream = ReceiverStream<Result<RateLaptopResponse, Status>>;

    async fn rate_laptop(
        &self,
        request: Request<Streaming<RateLaptopRequest>>,
    ) -> Result<Response<Self::RateLaptopStream>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());
        let stream = request.into_inner();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let server = self.clone();

        tokio::spawn(async move {
            if let Err(status) = server.rate_loop(ctx, stream, &tx).await {
                tracing::warn!(%status, "rate-laptop failed");
                let _ = tx.send(Err(status)).await;
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

fn receive_failed(what: &str, status: Status) -> Status {
    tracing::warn!(%status, "cannot receive {what}");
    Status::unknown(format!("cannot receive {what}: {}", status.message()))
}

/// Image types become file name suffixes, so only `.` followed by ASCII
/// alphanumerics is accepted. An empty type is allowed.
fn validate_image_type(image_type: &str) -> Result<(), Status> {
    let valid = image_type.is_empty()
        || image_type
            .strip_prefix('.')
            .is_some_and(|ext| !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric()));
    if valid {
        Ok(())
    } else {
        Err(Status::invalid_argument(format!(
            "invalid image type: {image_type:?}"
        )))
    }
}
