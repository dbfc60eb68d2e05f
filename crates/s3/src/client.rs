//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from sc-core.

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as SdkCompletedPart};

use sc_core::traits::ARTIFACT_CONTENT_TYPE;
use sc_core::{CompletedPart, Config, Error, ObjectInfo, ObjectStore, RemotePath, Result};

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
}

impl S3Client {
    /// Create a new S3 client from the configuration record
    pub async fn new(config: &Config) -> Result<Self> {
        config.validate_remote()?;

        let credentials = aws_credential_types::Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None, // session token
            None, // expiry
            "s3crypt-static-credentials",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        tracing::debug!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            force_path_style = config.force_path_style,
            "Created S3 client"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
        })
    }
}

/// Map a status code and service error code to an engine error
fn classify(status: Option<u16>, code: Option<&str>, what: String, detail: String) -> Error {
    match (status, code) {
        (_, Some("NoSuchKey" | "NoSuchBucket" | "NoSuchUpload" | "NotFound")) | (Some(404), _) => {
            Error::NotFound(what)
        }
        (_, Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"))
        | (Some(403), _) => Error::Access(format!("{what}: {detail}")),
        _ => Error::RemoteQuery(format!("{what}: {detail}")),
    }
}

fn map_sdk_error<E>(err: SdkError<E, HttpResponse>, what: String) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);
    let detail = DisplayErrorContext(&err).to_string();
    classify(status, code.as_deref(), what, detail)
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn head_object(&self, path: &RemotePath) -> Result<ObjectInfo> {
        let response = self
            .inner
            .head_object()
            .bucket(&path.bucket)
            .key(&path.key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, path.to_string()))?;

        let size = response
            .content_length()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| Error::RemoteQuery(format!("{path}: no content length in response")))?;

        let mut info = ObjectInfo::file(&path.key, size);
        if let Some(etag) = response.e_tag() {
            info.etag = Some(trim_etag(etag));
        }

        Ok(info)
    }

    async fn get_range(&self, path: &RemotePath, start: u64, end: u64) -> Result<Vec<u8>> {
        let response = self
            .inner
            .get_object()
            .bucket(&path.bucket)
            .key(&path.key)
            .range(format!("bytes={start}-{end}"))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("{path} bytes={start}-{end}")))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::RemoteQuery(format!("{path} bytes={start}-{end}: {e}")))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn put_object(&self, path: &RemotePath, data: &[u8]) -> Result<ObjectInfo> {
        let size = data.len() as u64;
        let response = self
            .inner
            .put_object()
            .bucket(&path.bucket)
            .key(&path.key)
            .content_type(ARTIFACT_CONTENT_TYPE)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, path.to_string()))?;

        let mut info = ObjectInfo::file(&path.key, size);
        if let Some(etag) = response.e_tag() {
            info.etag = Some(trim_etag(etag));
        }

        Ok(info)
    }

    async fn create_multipart_upload(&self, path: &RemotePath) -> Result<String> {
        let response = self
            .inner
            .create_multipart_upload()
            .bucket(&path.bucket)
            .key(&path.key)
            .content_type(ARTIFACT_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, path.to_string()))?;

        response
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::RemoteQuery(format!("{path}: no upload ID in response")))
    }

    async fn upload_part(
        &self,
        path: &RemotePath,
        upload_id: &str,
        part_number: i32,
        data: &[u8],
    ) -> Result<String> {
        let response = self
            .inner
            .upload_part()
            .bucket(&path.bucket)
            .key(&path.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("{path} part #{part_number}")))?;

        response
            .e_tag()
            .map(trim_etag)
            .ok_or_else(|| Error::RemoteQuery(format!("{path} part #{part_number}: no ETag")))
    }

    async fn complete_multipart_upload(
        &self,
        path: &RemotePath,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<ObjectInfo> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|p| {
                        SdkCompletedPart::builder()
                            .part_number(p.part_number)
                            .e_tag(&p.etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        let response = self
            .inner
            .complete_multipart_upload()
            .bucket(&path.bucket)
            .key(&path.key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, path.to_string()))?;

        // The completion response carries no size; the upload is final
        // at this point, so a failed lookup is only logged.
        let mut info = match self.head_object(path).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(object = %path, "Could not read size of completed upload: {e}");
                ObjectInfo::file(&path.key, 0)
            }
        };
        if let Some(etag) = response.e_tag() {
            info.etag = Some(trim_etag(etag));
        }

        Ok(info)
    }

    async fn abort_multipart_upload(&self, path: &RemotePath, upload_id: &str) -> Result<()> {
        self.inner
            .abort_multipart_upload()
            .bucket(&path.bucket)
            .key(&path.key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("{path} upload {upload_id}")))?;

        Ok(())
    }
}
