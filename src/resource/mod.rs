//! Typed clients for the example collection and the session endpoint.

mod error;

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::domain::{ExampleRecord, UserInfo, sort_by_name};
use crate::transport::{Transport, TransportError};

pub use error::ClientError;

const COLLECTION: &str = "example";
const INFO: &str = "info";

/// List/get/create/replace/delete over the `/example` collection.
///
/// Errors from the transport propagate unchanged, except a `409` on create,
/// which is reported as [`ClientError::Conflict`] with the transport error as
/// its source.
#[derive(Clone)]
pub struct ResourceClient {
    transport: Arc<dyn Transport>,
}

impl ResourceClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// All records, sorted by name ascending.
    pub async fn list(&self) -> Result<Vec<ExampleRecord>, ClientError> {
        debug!("listExamples");
        let value = self
            .transport
            .request(Method::GET, &[COLLECTION], None)
            .await?;
        let mut records: Vec<ExampleRecord> = decode(value)?;
        sort_by_name(&mut records);
        Ok(records)
    }

    /// The record named `name`, or `None` without a request when nothing is
    /// selected.
    pub async fn get(&self, name: Option<&str>) -> Result<Option<ExampleRecord>, ClientError> {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        debug!(name, "getExample");
        let value = self
            .transport
            .request(Method::GET, &[COLLECTION, name], None)
            .await?;
        Ok(Some(decode(value)?))
    }

    pub async fn create(&self, record: &ExampleRecord) -> Result<(), ClientError> {
        debug!(name = %record.name, age = record.age, "createExample");
        let body = encode(record)?;
        match self
            .transport
            .request(Method::POST, &[COLLECTION], Some(body))
            .await
        {
            Ok(_) => Ok(()),
            Err(source) if source.is_conflict() => Err(ClientError::Conflict {
                name: record.name.clone(),
                source,
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Full replace of the record at `name`. The path name wins over any name
    /// carried by the payload.
    pub async fn replace(&self, name: &str, record: &ExampleRecord) -> Result<(), ClientError> {
        debug!(name, age = record.age, "replaceExample");
        let payload = ExampleRecord {
            name: name.to_string(),
            age: record.age,
        };
        let body = encode(&payload)?;
        self.transport
            .request(Method::PUT, &[COLLECTION, name], Some(body))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<(), ClientError> {
        debug!(name, "deleteExample");
        self.transport
            .request(Method::DELETE, &[COLLECTION, name], None)
            .await?;
        Ok(())
    }
}

/// Reads the signed-in user's session information.
#[derive(Clone)]
pub struct SessionClient {
    transport: Arc<dyn Transport>,
}

impl SessionClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn user_info(&self) -> Result<UserInfo, ClientError> {
        debug!("fetchUserInfo");
        let value = self.transport.request(Method::GET, &[INFO], None).await?;
        decode(value)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value)
        .map_err(|err| ClientError::Transport(TransportError::decode(err.to_string())))
}

fn encode<T: Serialize>(body: &T) -> Result<Value, ClientError> {
    serde_json::to_value(body).map_err(|err| ClientError::Encode {
        message: err.to_string(),
    })
}
