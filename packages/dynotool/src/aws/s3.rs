//! `ObjectStore` over the S3 SDK.

use std::sync::Arc;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use super::{classify, AwsContext};
use crate::error::{DynoError, Result};
use crate::target::ObjectStore;

pub struct S3ObjectStore {
    context: Arc<AwsContext>,
    client: Client,
}

impl S3ObjectStore {
    pub fn new(context: Arc<AwsContext>) -> Self {
        // Emulators serve buckets by path, not by virtual host.
        let config = aws_sdk_s3::config::Builder::from(context.sdk_config())
            .force_path_style(context.has_custom_endpoint())
            .build();
        let client = Client::from_conf(config);
        Self { context, client }
    }
}

impl ObjectStore for S3ObjectStore {
    fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let size = body.len();
        self.context
            .block_on(
                self.client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .content_type("application/json")
                    .body(ByteStream::from(body))
                    .send(),
            )
            .map_err(|e| classify("PutObject", e))?;
        tracing::debug!(bucket, key, size, "object written");
        Ok(())
    }

    fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let output = self
                .context
                .block_on(
                    self.client
                        .list_objects_v2()
                        .bucket(bucket)
                        .set_continuation_token(token.take())
                        .send(),
                )
                .map_err(|e| classify("ListObjectsV2", e))?;
            keys.extend(output.contents().iter().filter_map(|o| o.key().map(str::to_string)));
            match output.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(keys)
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.context.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| classify("GetObject", e))?;
            let body = output.body.collect().await.map_err(|e| DynoError::Service {
                operation: "GetObject".to_string(),
                code: "BodyRead".to_string(),
                message: e.to_string(),
            })?;
            Ok::<_, DynoError>(body.into_bytes().to_vec())
        })
    }
}
