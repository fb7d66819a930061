//! Job definitions and capability tags

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Keys reserved by the wire payload; never part of a job body
pub const RESERVED_KEYS: [&str; 3] = ["name", "id", "meta"];

/// Identifier correlating one job instance (any scalar the producer chose)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobId {
    Number(Number),
    Bool(bool),
    Text(String),
}

impl JobId {
    /// Generate a new random job ID
    pub fn generate() -> Self {
        JobId::Text(Uuid::new_v4().to_string())
    }

    /// Check if this ID carries no information
    pub fn is_empty(&self) -> bool {
        matches!(self, JobId::Text(s) if s.is_empty())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Number(n) => write!(f, "{}", n),
            JobId::Bool(b) => write!(f, "{}", b),
            JobId::Text(s) => f.write_str(s),
        }
    }
}

/// Integers become numeric IDs; anything else is kept as text
impl FromStr for JobId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<i64>() {
            return Ok(JobId::from(n));
        }
        if let Ok(n) = s.parse::<u64>() {
            return Ok(JobId::from(n));
        }
        Ok(JobId::from(s))
    }
}

impl From<bool> for JobId {
    fn from(b: bool) -> Self {
        JobId::Bool(b)
    }
}

impl From<i64> for JobId {
    fn from(n: i64) -> Self {
        JobId::Number(n.into())
    }
}

impl From<u64> for JobId {
    fn from(n: u64) -> Self {
        JobId::Number(n.into())
    }
}

impl From<i32> for JobId {
    fn from(n: i32) -> Self {
        JobId::Number(n.into())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        JobId::Text(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId::Text(s.to_string())
    }
}

/// Delivery state of a pushed job, as reported by drivers that can track it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is waiting in the queue
    Waiting,
    /// Job was handed to a consumer and is being processed
    Reserved,
    /// Job was processed
    Done,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Waiting => write!(f, "waiting"),
            JobStatus::Reserved => write!(f, "reserved"),
            JobStatus::Done => write!(f, "done"),
        }
    }
}

/// Queue feature a job type requires beyond plain delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Execution must be postponed by the transport
    Delayable,
    /// Delivery order depends on a job priority
    Prioritized,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Delayable => write!(f, "delayable"),
            Capability::Prioritized => write!(f, "prioritized"),
        }
    }
}

/// Anything the queue runtime can hand to a driver
pub trait Job: Send + Sync {
    /// Handler/type identifier
    fn name(&self) -> &str;

    /// Queue features this job requires
    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    /// Check if this job requires a given queue feature
    fn requires(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// A job type that declares its name and capabilities statically
///
/// ```ignore
/// #[derive(Serialize)]
/// struct SendReport { recipient: String }
///
/// impl TypedJob for SendReport {
///     const NAME: &'static str = "send-report";
/// }
///
/// let job = JobDescriptor::from_typed(&SendReport { .. }, JobId::generate())?;
/// ```
pub trait TypedJob: Serialize {
    const NAME: &'static str;
    const CAPABILITIES: &'static [Capability] = &[];
}

/// The unit of work moved through the broker
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
    name: String,
    id: JobId,
    meta: Option<String>,
    body: Map<String, Value>,
    capabilities: Vec<Capability>,
}

impl JobDescriptor {
    /// Create a job with an empty body
    pub fn new(name: impl Into<String>, id: impl Into<JobId>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            meta: None,
            body: Map::new(),
            capabilities: Vec::new(),
        }
    }

    /// Build a descriptor from a typed job; the job must serialize to a map
    pub fn from_typed<J: TypedJob>(job: &J, id: impl Into<JobId>) -> crate::Result<Self> {
        let body = match serde_json::to_value(job)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(crate::Error::Serialization(format!(
                    "job `{}` must serialize to a map, got {}",
                    J::NAME,
                    kind_of(&other)
                )))
            }
        };

        Ok(Self::new(J::NAME, id)
            .with_body(body)
            .with_capabilities(J::CAPABILITIES.iter().copied()))
    }

    /// Set auxiliary context
    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    /// Replace the body; reserved keys are dropped
    pub fn with_body(mut self, mut body: Map<String, Value>) -> Self {
        for key in RESERVED_KEYS {
            body.remove(key);
        }
        self.body = body;
        self
    }

    /// Add a single body field; reserved keys are ignored
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !RESERVED_KEYS.contains(&key.as_str()) {
            self.body.insert(key, value.into());
        }
        self
    }

    /// Declare a queue feature this job requires
    pub fn with_capability(mut self, capability: Capability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    /// Declare several queue features
    pub fn with_capabilities(self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        capabilities
            .into_iter()
            .fold(self, |job, capability| job.with_capability(capability))
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn meta(&self) -> Option<&str> {
        self.meta.as_deref()
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Look up a body field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Deserialize the body into a concrete type
    pub fn body_as<T: for<'de> Deserialize<'de>>(&self) -> crate::Result<T> {
        serde_json::from_value(Value::Object(self.body.clone()))
            .map_err(|e| crate::Error::Deserialization(e.to_string()))
    }
}

impl Job for JobDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }
}

/// Wire form: a flat map `{name, id, meta?, ...body}`
impl Serialize for JobDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 2 + usize::from(self.meta.is_some()) + self.body.len();
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("id", &self.id)?;
        if let Some(meta) = &self.meta {
            map.serialize_entry("meta", meta)?;
        }
        for (key, value) in &self.body {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Resize {
        width: u32,
    }

    impl TypedJob for Resize {
        const NAME: &'static str = "resize";
        const CAPABILITIES: &'static [Capability] = &[Capability::Prioritized];
    }

    #[test]
    fn test_job_creation() {
        let job = JobDescriptor::new("ext-simple", 1).with_field("to", "ops");
        assert_eq!(job.name(), "ext-simple");
        assert_eq!(job.id(), &JobId::from(1));
        assert_eq!(job.meta(), None);
        assert_eq!(job.field("to"), Some(&json!("ops")));
        assert!(job.capabilities().is_empty());
    }

    #[test]
    fn test_reserved_keys_stay_out_of_body() {
        let mut body = Map::new();
        body.insert("name".into(), json!("shadow"));
        body.insert("size".into(), json!(3));

        let job = JobDescriptor::new("real", "a1")
            .with_body(body)
            .with_field("id", 99);

        assert_eq!(job.name(), "real");
        assert_eq!(job.body().len(), 1);
        assert_eq!(job.field("size"), Some(&json!(3)));
    }

    #[test]
    fn test_wire_form_is_flat() {
        let job = JobDescriptor::new("mail", "j-1")
            .with_meta("trace=abc")
            .with_field("to", "ops@example.com");

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(
            value,
            json!({"name": "mail", "id": "j-1", "meta": "trace=abc", "to": "ops@example.com"})
        );
    }

    #[test]
    fn test_wire_form_omits_absent_meta() {
        let value = serde_json::to_value(JobDescriptor::new("mail", 7)).unwrap();
        assert_eq!(value, json!({"name": "mail", "id": 7}));
    }

    #[test]
    fn test_typed_job_declares_capabilities() {
        let job = JobDescriptor::from_typed(&Resize { width: 640 }, 5).unwrap();
        assert_eq!(job.name(), "resize");
        assert!(job.requires(Capability::Prioritized));
        assert!(!job.requires(Capability::Delayable));
        assert_eq!(job.field("width"), Some(&json!(640)));
    }

    #[test]
    fn test_typed_job_must_be_a_map() {
        #[derive(Serialize)]
        struct Bare(u32);

        impl TypedJob for Bare {
            const NAME: &'static str = "bare";
        }

        assert!(JobDescriptor::from_typed(&Bare(1), 1).is_err());
    }

    #[test]
    fn test_job_id_display_and_generation() {
        assert_eq!(JobId::from(42).to_string(), "42");
        assert_eq!(JobId::from("abc").to_string(), "abc");
        assert!(JobId::from("").is_empty());
        assert_ne!(JobId::generate(), JobId::generate());
    }

    #[test]
    fn test_job_id_from_str() {
        assert_eq!("7".parse::<JobId>().unwrap(), JobId::from(7));
        assert_eq!("-3".parse::<JobId>().unwrap(), JobId::from(-3));
        assert_eq!("a-7".parse::<JobId>().unwrap(), JobId::from("a-7"));
        assert_eq!("true".parse::<JobId>().unwrap(), JobId::from("true"));
        assert_eq!(serde_json::to_string(&"7".parse::<JobId>().unwrap()).unwrap(), "7");
    }

    #[test]
    fn test_body_as() {
        #[derive(Deserialize)]
        struct Mail {
            to: String,
        }

        let job = JobDescriptor::new("mail", 1).with_field("to", "a@b.c");
        let mail: Mail = job.body_as().unwrap();
        assert_eq!(mail.to, "a@b.c");
    }
}
