//! Adapters from the engine's blocking collaborator traits to the AWS SDK.
//!
//! The SDK is async; the engine is not. An `AwsContext` owns a small tokio
//! runtime and every adapter call is one `block_on` round trip. SDK-level
//! retries are disabled so the only backoff is the engine's own.

mod dynamo;
mod lambda;
mod s3;

pub use dynamo::DynamoClient;
pub use lambda::LambdaInvoker;
pub use s3::S3ObjectStore;

use std::future::Future;

use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use crate::error::{DynoError, Result};

/// Where and as whom to connect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsSettings {
    pub profile: Option<String>,
    pub region: Option<String>,
    /// Override for local emulators.
    pub endpoint_url: Option<String>,
}

pub struct AwsContext {
    runtime: tokio::runtime::Runtime,
    sdk: SdkConfig,
    custom_endpoint: bool,
}

impl AwsContext {
    /// Resolve credentials and region, honouring `settings` over the
    /// environment and shared config files.
    pub fn connect(settings: &AwsSettings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("dynotool-aws")
            .enable_all()
            .build()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).retry_config(RetryConfig::disabled());
        if let Some(profile) = &settings.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk = runtime.block_on(loader.load());
        if sdk.region().is_none() {
            return Err(DynoError::Config(
                "no region configured; pass --region or set AWS_REGION".to_string(),
            ));
        }
        tracing::debug!(
            profile = settings.profile.as_deref().unwrap_or("default"),
            region = ?sdk.region(),
            endpoint = settings.endpoint_url.as_deref().unwrap_or("default"),
            "aws context ready"
        );
        Ok(Self {
            runtime,
            sdk,
            custom_endpoint: settings.endpoint_url.is_some(),
        })
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.sdk
    }

    /// True when requests go to an emulator rather than the AWS endpoints.
    pub fn has_custom_endpoint(&self) -> bool {
        self.custom_endpoint
    }

    /// Drive one SDK future to completion on the owned runtime.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Map any SDK failure onto the engine's error model. Throughput codes
/// become `Throttled`; everything else is a `Service` error.
pub(crate) fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> DynoError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    tracing::debug!(operation, code = code.as_deref().unwrap_or("none"), "service call failed");
    DynoError::from_service(operation, code.as_deref(), message)
}
