//! Trait-based boundary for AWS infrastructure lookups
//!
//! The reconcilers only need two things from AWS: the output values of a
//! CloudFormation stack and the decrypted material of a Secrets Manager
//! secret. Both sit behind the `CloudProvider` trait so tests can inject
//! canned values.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Decrypted Forge service-user credentials stored in Secrets Manager.
#[derive(Debug, Clone, Deserialize)]
pub struct ForgeSecret {
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
}

/// Infrastructure collaborator: stack outputs and secret material.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Retrieve output values for a CloudFormation stack, keyed by output
    /// name, with the stack name itself included under `stack_name`.
    async fn stack_outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>>;

    /// Retrieve and decode the value of a Secrets Manager secret.
    async fn secret_value(&self, secret_arn: &str) -> Result<ForgeSecret>;
}

/// Real `CloudProvider` backed by the AWS SDK.
pub struct AwsCloudProvider {
    cloudformation: aws_sdk_cloudformation::Client,
    secretsmanager: aws_sdk_secretsmanager::Client,
}

impl AwsCloudProvider {
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            cloudformation: aws_sdk_cloudformation::Client::new(&config),
            secretsmanager: aws_sdk_secretsmanager::Client::new(&config),
        }
    }
}

#[async_trait]
impl CloudProvider for AwsCloudProvider {
    async fn stack_outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>> {
        let response = self
            .cloudformation
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| Error::Cloud(format!("describe-stacks {stack_name}: {e}")))?;
        let stack = response
            .stacks()
            .first()
            .ok_or_else(|| Error::Cloud(format!("stack {stack_name} not found")))?;
        let mut outputs: BTreeMap<String, String> = stack
            .outputs()
            .iter()
            .filter_map(|output| {
                Some((
                    output.output_key()?.to_string(),
                    output.output_value()?.to_string(),
                ))
            })
            .collect();
        outputs.insert("stack_name".to_string(), stack_name.to_string());
        Ok(outputs)
    }

    async fn secret_value(&self, secret_arn: &str) -> Result<ForgeSecret> {
        let response = self
            .secretsmanager
            .get_secret_value()
            .secret_id(secret_arn)
            .send()
            .await
            .map_err(|e| Error::Cloud(format!("get-secret-value {secret_arn}: {e}")))?;
        let raw = response
            .secret_string()
            .ok_or_else(|| Error::Cloud(format!("secret {secret_arn} has no string value")))?;
        Ok(serde_json::from_str(raw)?)
    }
}

/// Canned `CloudProvider` for tests.
#[derive(Debug, Default)]
pub struct MockCloudProvider {
    pub outputs: BTreeMap<String, BTreeMap<String, String>>,
    pub secrets: BTreeMap<String, ForgeSecret>,
}

impl MockCloudProvider {
    pub fn with_stack(
        mut self,
        stack_name: &str,
        outputs: &[(&str, &str)],
    ) -> Self {
        let mut map: BTreeMap<String, String> = outputs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        map.insert("stack_name".to_string(), stack_name.to_string());
        self.outputs.insert(stack_name.to_string(), map);
        self
    }

    pub fn with_secret(mut self, secret_arn: &str, secret: ForgeSecret) -> Self {
        self.secrets.insert(secret_arn.to_string(), secret);
        self
    }
}

#[async_trait]
impl CloudProvider for MockCloudProvider {
    async fn stack_outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>> {
        self.outputs
            .get(stack_name)
            .cloned()
            .ok_or_else(|| Error::Cloud(format!("stack {stack_name} not found")))
    }

    async fn secret_value(&self, secret_arn: &str) -> Result<ForgeSecret> {
        self.secrets
            .get(secret_arn)
            .cloned()
            .ok_or_else(|| Error::Cloud(format!("secret {secret_arn} not found")))
    }
}
