//! Message serialization and the envelope handed to consumers

use crate::job::{Job, JobDescriptor, JobId};
use crate::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Serialization format for message bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Serializer {
    /// JSON format (human-readable, larger)
    #[default]
    Json,
    /// MessagePack format (binary, compact, fast)
    #[serde(alias = "msgpack")]
    MessagePack,
}

impl Serializer {
    /// Get the content type string for this serializer
    pub fn content_type(&self) -> &'static str {
        match self {
            Serializer::Json => "application/json",
            Serializer::MessagePack => "application/x-msgpack",
        }
    }

    /// Parse content type string to serializer
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "application/json" | "text/json" => Some(Serializer::Json),
            "application/x-msgpack" => Some(Serializer::MessagePack),
            _ => None,
        }
    }

    /// Serialize a value
    pub fn serialize<T: Serialize>(&self, value: &T) -> Result<Bytes> {
        match self {
            Serializer::Json => {
                let data = serde_json::to_vec(value)?;
                Ok(Bytes::from(data))
            }
            Serializer::MessagePack => {
                // Named maps so the decoder sees keys, not positions
                let data = rmp_serde::to_vec_named(value)?;
                Ok(Bytes::from(data))
            }
        }
    }

    /// Deserialize a value
    pub fn deserialize<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        match self {
            Serializer::Json => serde_json::from_slice(data)
                .map_err(|e| crate::Error::Deserialization(e.to_string())),
            Serializer::MessagePack => Ok(rmp_serde::from_slice(data)?),
        }
    }
}

impl std::str::FromStr for Serializer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Serializer::Json),
            "msgpack" | "messagepack" => Ok(Serializer::MessagePack),
            _ => Err(format!("Unknown serializer: {}", s)),
        }
    }
}

/// Envelope pairing a job with its transport identity
///
/// The AMQP transport assigns no identity that survives the round trip, so
/// the envelope carries the job alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    job: JobDescriptor,
}

impl Message {
    /// Wrap a job
    pub fn new(job: JobDescriptor) -> Self {
        Self { job }
    }

    pub fn job(&self) -> &JobDescriptor {
        &self.job
    }

    pub fn into_job(self) -> JobDescriptor {
        self.job
    }

    /// Get the job ID
    pub fn id(&self) -> &JobId {
        self.job.id()
    }

    /// Get the job name
    pub fn name(&self) -> &str {
        self.job.name()
    }
}

impl From<JobDescriptor> for Message {
    fn from(job: JobDescriptor) -> Self {
        Message::new(job)
    }
}
