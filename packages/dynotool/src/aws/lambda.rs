//! `RemoteInvoker` over the Lambda SDK.

use std::sync::Arc;

use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client;

use super::{classify, AwsContext};
use crate::error::Result;
use crate::launcher::RemoteInvoker;

pub struct LambdaInvoker {
    context: Arc<AwsContext>,
    client: Client,
}

impl LambdaInvoker {
    pub fn new(context: Arc<AwsContext>) -> Self {
        let client = Client::new(context.sdk_config());
        Self { context, client }
    }
}

impl RemoteInvoker for LambdaInvoker {
    fn invoke_async(&self, function: &str, payload: &[u8]) -> Result<u16> {
        let output = self
            .context
            .block_on(
                self.client
                    .invoke()
                    .function_name(function)
                    .invocation_type(InvocationType::Event)
                    .payload(Blob::new(payload.to_vec()))
                    .send(),
            )
            .map_err(|e| classify("Invoke", e))?;
        let status = u16::try_from(output.status_code()).unwrap_or(0);
        tracing::debug!(function, status, "function invoked");
        Ok(status)
    }
}
