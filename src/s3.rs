use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use crate::error::MediaError;
use crate::media::BlobStore;

/// Minimal object-store surface the media store needs.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn upload_bytes(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<()>;
}

/// A bucket on S3. Region and credentials come from the standard AWS
/// environment (`AWS_REGION`, `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`).
#[derive(Clone)]
pub struct S3Client {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Client {
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let bucket = bucket.into();
        info!("Uploading media to s3://{}", bucket);
        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket,
        }
    }
}

#[async_trait]
impl ObjectClient for S3Client {
    async fn upload_bytes(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(e)))?;
        Ok(())
    }
}

/// Stores blobs as `{prefix}/{key}` objects, tagged with their content type.
pub struct ObjectBlobStore<C> {
    client: C,
    prefix: String,
}

impl<C: ObjectClient> ObjectBlobStore<C> {
    pub fn new(client: C, prefix: &str) -> Self {
        Self {
            client,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    fn object_key(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }
}

#[async_trait]
impl<C: ObjectClient> BlobStore for ObjectBlobStore<C> {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), MediaError> {
        let object_key = self.object_key(key);
        self.client
            .upload_bytes(bytes.to_vec(), &object_key, content_type)
            .await
            .map_err(|e| MediaError::Upload {
                key: object_key.clone(),
                reason: format!("{:#}", e),
            })?;
        debug!("Uploaded {} ({}, {} bytes)", object_key, content_type, bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::media::{materialize, MediaFetcher, MediaOptions};
    use crate::model::{ContentBlock, CrawlRecord, ImageDetails, Post};
    use crate::resolver;

    const HOST: &str = "https://lexus.jp";

    /// Records every upload as (key, content type, body).
    #[derive(Default)]
    struct RecordingClient {
        uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
        reject: Option<String>,
    }

    #[async_trait]
    impl ObjectClient for RecordingClient {
        async fn upload_bytes(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<()> {
            if self.reject.as_deref() == Some(key) {
                anyhow::bail!("AccessDenied");
            }
            self.uploads
                .lock()
                .unwrap()
                .push((key.to_string(), content_type.to_string(), bytes));
            Ok(())
        }
    }

    struct EchoFetcher;

    #[async_trait]
    impl MediaFetcher for EchoFetcher {
        async fn get(&self, url: &str) -> Result<Vec<u8>, MediaError> {
            Ok(url.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn key_prefixed_and_content_type_passed() {
        let store = ObjectBlobStore::new(RecordingClient::default(), "media/");
        store.put("magazine/img/a.jpg", b"jpeg", "image/jpeg").await.unwrap();

        let uploads = store.client.uploads.lock().unwrap();
        assert_eq!(
            *uploads,
            vec![(
                "media/magazine/img/a.jpg".to_string(),
                "image/jpeg".to_string(),
                b"jpeg".to_vec()
            )]
        );
    }

    #[tokio::test]
    async fn materialized_items_keep_their_kind() {
        let post = Post {
            post_url: "/magazine/post/a".into(),
            title: String::new(),
            credit: None,
            note: None,
            feature_image: None,
            profiles: Vec::new(),
            content: vec![
                ContentBlock::Image {
                    image: ImageDetails {
                        url: resolver::resolve(Some("/m/1.jpg"), HOST).ok(),
                        height: None,
                        width: None,
                        alt: String::new(),
                        caption: String::new(),
                    },
                },
                ContentBlock::Audio {
                    url: resolver::resolve(Some("/m/a.mp3"), HOST).ok(),
                },
            ],
        };
        let store = ObjectBlobStore::new(RecordingClient::default(), "media");
        let opts = MediaOptions {
            host: HOST.into(),
            images_only: false,
        };

        let report = materialize(&[CrawlRecord::Post(post)], &EchoFetcher, &store, &opts).await;

        assert_eq!(report.succeeded, 2);
        let uploads = store.client.uploads.lock().unwrap();
        let keys: Vec<(&str, &str)> = uploads
            .iter()
            .map(|(k, ct, _)| (k.as_str(), ct.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("media/m/1.jpg", "image/jpeg"), ("media/m/a.mp3", "audio/mpeg")]
        );
    }

    #[tokio::test]
    async fn rejected_upload_is_an_upload_error() {
        let client = RecordingClient {
            reject: Some("media/m/x.jpg".into()),
            ..Default::default()
        };
        let store = ObjectBlobStore::new(client, "media");
        assert!(matches!(
            store.put("m/x.jpg", b"x", "image/jpeg").await,
            Err(MediaError::Upload { key, .. }) if key == "media/m/x.jpg"
        ));
    }
}
