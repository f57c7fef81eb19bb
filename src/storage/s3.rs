//! `aws-sdk-s3` backed object store
//!
//! Alibaba OSS and Google Cloud Storage are reached through their
//! S3-compatible endpoints, so one client implementation serves all three
//! providers; only region, endpoint and credentials differ.

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as AwsCompletedPart};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

use super::error::{StorageError, StorageResult};
use super::{
    ByteRange, CompletedPart, ListPage, ObjectDescriptor, ObjectHead, ObjectStore, StoreFactory,
};
use crate::config::{ProviderSettings, StorageSettings};
use crate::locator::{Locator, Provider};

/// S3-compatible store bound to one bucket
#[derive(Debug, Clone)]
pub struct S3Store {
    client: AwsS3Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for `provider` and bind it to `bucket`
    pub async fn connect(
        provider: Provider,
        settings: &ProviderSettings,
        bucket: impl Into<String>,
    ) -> StorageResult<Self> {
        settings
            .validate()
            .map_err(|e| StorageError::InvalidConfig(e.to_string()))?;

        let client = build_client(provider, settings).await;
        Ok(Self {
            client,
            bucket: bucket.into(),
        })
    }
}

async fn build_client(provider: Provider, settings: &ProviderSettings) -> AwsS3Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    let region_provider = match &settings.region {
        Some(region) => RegionProviderChain::first_try(Region::new(region.clone())),
        None => RegionProviderChain::default_provider(),
    };
    loader = loader.region(region_provider);

    if let Some(profile) = &settings.profile {
        loader = loader.profile_name(profile);
    } else if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key)
    {
        let credentials = Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "stratus-static",
        );
        loader = loader.credentials_provider(credentials);
    }

    let shared = loader.load().await;
    let mut builder = aws_sdk_s3::config::Builder::from(&shared);

    if let Some(endpoint) = settings.endpoint_url() {
        builder = builder.endpoint_url(endpoint);
    }
    if settings.force_path_style {
        builder = builder.force_path_style(true);
    }

    debug!(
        provider = %provider,
        region = ?settings.region,
        endpoint = ?settings.endpoint,
        "built storage client"
    );

    AwsS3Client::from_conf(builder.build())
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ListPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix);

        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let response = request.send().await?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?.to_string();
                let size = obj.size().unwrap_or(0).max(0) as u64;
                Some(ObjectDescriptor::new(key, size))
            })
            .collect();

        Ok(ListPage {
            objects,
            is_truncated: response.is_truncated().unwrap_or(false),
            next_continuation_token: response.next_continuation_token().map(str::to_string),
        })
    }

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectHead>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => Ok(Some(ObjectHead {
                size: response.content_length().unwrap_or(0).max(0) as u64,
            })),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Ok(None)
                } else {
                    Err(StorageError::from(e))
                }
            }
        }
    }

    async fn get(&self, key: &str, range: Option<ByteRange>) -> StorageResult<Bytes> {
        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(range) = range {
            request = request.range(range.to_header());
        }

        let response = request.send().await.map_err(|e| {
            if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                StorageError::NotFound {
                    bucket: self.bucket.clone(),
                    key: key.to_string(),
                }
            } else {
                StorageError::from(e)
            }
        })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Network(format!("failed to read body of {}: {}", key, e)))?;

        Ok(body.into_bytes())
    }

    async fn put(&self, key: &str, body: Bytes, content_md5: Option<String>) -> StorageResult<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body));

        if let Some(md5) = content_md5 {
            request = request.content_md5(md5);
        }

        request.send().await?;
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> StorageResult<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;

        response
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Protocol("no upload id returned".to_string()))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
        content_md5: Option<String>,
    ) -> StorageResult<String> {
        let mut request = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body));

        if let Some(md5) = content_md5 {
            request = request.content_md5(md5);
        }

        let response = request.send().await?;

        response.e_tag().map(str::to_string).ok_or_else(|| {
            StorageError::Protocol(format!("no ETag returned for part {}", part_number))
        })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        let completed: Vec<AwsCompletedPart> = parts
            .iter()
            .map(|p| {
                AwsCompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(upload)
            .send()
            .await?;

        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await?;

        Ok(())
    }
}

/// Opens [`S3Store`]s using per-provider settings
#[derive(Debug, Clone)]
pub struct S3StoreFactory {
    settings: StorageSettings,
}

impl S3StoreFactory {
    pub fn new(settings: StorageSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl StoreFactory for S3StoreFactory {
    async fn open(&self, locator: &Locator) -> StorageResult<Arc<dyn ObjectStore>> {
        let settings = self.settings.provider(locator.provider);
        let store = S3Store::connect(locator.provider, settings, locator.bucket.clone()).await?;
        Ok(Arc::new(store))
    }
}
