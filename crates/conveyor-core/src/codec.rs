//! Payload codec: raw broker bodies to job descriptors and back
//!
//! Decoding validates the reserved keys in a fixed order (`name`, `id`,
//! `meta`) so the first problem found is the one reported.

use crate::error::{FieldProblem, PayloadError, PayloadField};
use crate::job::{kind_of, JobDescriptor, JobId};
use crate::message::{Message, Serializer};
use bytes::Bytes;
use serde_json::{Map, Value};

/// Encodes jobs for publishing and decodes delivered bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCodec {
    serializer: Serializer,
}

impl PayloadCodec {
    pub fn new(serializer: Serializer) -> Self {
        Self { serializer }
    }

    pub fn serializer(&self) -> Serializer {
        self.serializer
    }

    /// Serialize a job into its wire form
    pub fn encode(&self, job: &JobDescriptor) -> crate::Result<Bytes> {
        self.serializer.serialize(job)
    }

    /// Decode a delivered body into an envelope
    pub fn decode_message(&self, raw: &[u8]) -> Result<Message, PayloadError> {
        self.decode(raw).map(Message::new)
    }

    /// Decode a delivered body into a job descriptor
    pub fn decode(&self, raw: &[u8]) -> Result<JobDescriptor, PayloadError> {
        let value: Value = self
            .serializer
            .deserialize(raw)
            .map_err(|e| PayloadError::malformed(e.to_string()))?;

        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(PayloadError::malformed(format!(
                    "expected a map, found {}",
                    kind_of(&other)
                )))
            }
        };

        let name = take_name(&mut map)?;
        let id = take_id(&mut map)?;
        let meta = take_meta(&mut map)?;

        let job = JobDescriptor::new(name, id).with_body(map);
        Ok(match meta {
            Some(meta) => job.with_meta(meta),
            None => job,
        })
    }
}

fn take_name(map: &mut Map<String, Value>) -> Result<String, PayloadError> {
    match map.remove("name") {
        None | Some(Value::Null) => Err(PayloadError::missing(
            PayloadField::Name,
            FieldProblem::Absent,
        )),
        Some(Value::String(s)) if s.is_empty() => Err(PayloadError::missing(
            PayloadField::Name,
            FieldProblem::Empty,
        )),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(PayloadError::missing(
            PayloadField::Name,
            FieldProblem::WrongType { expected: "string" },
        )),
    }
}

fn take_id(map: &mut Map<String, Value>) -> Result<JobId, PayloadError> {
    match map.remove("id") {
        None | Some(Value::Null) => Err(PayloadError::missing(
            PayloadField::Id,
            FieldProblem::Absent,
        )),
        Some(Value::String(s)) if s.is_empty() => Err(PayloadError::missing(
            PayloadField::Id,
            FieldProblem::Empty,
        )),
        Some(Value::String(s)) => Ok(JobId::Text(s)),
        Some(Value::Number(n)) => Ok(JobId::Number(n)),
        Some(Value::Bool(b)) => Ok(JobId::Bool(b)),
        Some(_) => Err(PayloadError::missing(
            PayloadField::Id,
            FieldProblem::WrongType { expected: "scalar" },
        )),
    }
}

fn take_meta(map: &mut Map<String, Value>) -> Result<Option<String>, PayloadError> {
    match map.remove("meta") {
        None | Some(Value::Null) => Ok(None),
        // Present but empty counts as invalid, not as absent
        Some(Value::String(s)) if s.is_empty() => Err(PayloadError::missing(
            PayloadField::Meta,
            FieldProblem::Empty,
        )),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(PayloadError::missing(
            PayloadField::Meta,
            FieldProblem::WrongType { expected: "string" },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use serde_json::json;

    fn decode(value: Value) -> Result<JobDescriptor, PayloadError> {
        let raw = serde_json::to_vec(&value).unwrap();
        PayloadCodec::default().decode(&raw)
    }

    fn assert_missing(result: Result<JobDescriptor, PayloadError>, expected: PayloadField) {
        match result {
            Err(PayloadError::MissingField { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected missing `{}`, got {:?}", expected, other),
        }
    }

    #[test]
    fn test_non_map_payloads_are_malformed() {
        for value in [json!("test"), json!(["test"]), json!(42), json!(null), json!(true)] {
            let err = decode(value.clone()).unwrap_err();
            assert!(err.is_malformed(), "{} should be malformed", value);
        }
    }

    #[test]
    fn test_unparseable_body_is_malformed() {
        let err = PayloadCodec::default().decode(b"{not json").unwrap_err();
        assert!(err.is_malformed());

        let err = PayloadCodec::default().decode(b"").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_missing_name() {
        assert_missing(decode(json!({"id": 1})), PayloadField::Name);
        assert_missing(decode(json!({})), PayloadField::Name);
        assert_missing(decode(json!({"name": "", "id": 1})), PayloadField::Name);
        assert_missing(decode(json!({"name": 5, "id": 1})), PayloadField::Name);
    }

    #[test]
    fn test_missing_id() {
        assert_missing(decode(json!({"name": "ext-simple"})), PayloadField::Id);
        assert_missing(decode(json!({"name": "ext-simple", "id": null})), PayloadField::Id);
        assert_missing(decode(json!({"name": "ext-simple", "id": ""})), PayloadField::Id);
        assert_missing(decode(json!({"name": "ext-simple", "id": [1]})), PayloadField::Id);
    }

    #[test]
    fn test_id_is_checked_before_meta() {
        let err = decode(json!({"name": "ext-simple", "meta": ""})).unwrap_err();
        assert_eq!(
            err,
            PayloadError::MissingField {
                field: PayloadField::Id,
                problem: FieldProblem::Absent,
            }
        );
    }

    #[test]
    fn test_empty_meta_is_rejected() {
        let err = decode(json!({"name": "ext-simple", "id": 1, "meta": ""})).unwrap_err();
        assert_eq!(
            err,
            PayloadError::MissingField {
                field: PayloadField::Meta,
                problem: FieldProblem::Empty,
            }
        );
    }

    #[test]
    fn test_non_string_meta_is_rejected() {
        assert_missing(
            decode(json!({"name": "ext-simple", "id": 1, "meta": {"a": 1}})),
            PayloadField::Meta,
        );
    }

    #[test]
    fn test_well_formed_payload() {
        let job = decode(json!({"name": "ext-simple", "id": 1})).unwrap();
        assert_eq!(job.name(), "ext-simple");
        assert_eq!(job.id(), &JobId::from(1));
        assert_eq!(job.meta(), None);
        assert!(job.body().is_empty());
    }

    #[test]
    fn test_boolean_id_is_accepted() {
        let job = decode(json!({"name": "ext-simple", "id": true})).unwrap();
        assert_eq!(job.id(), &JobId::Bool(true));

        let raw = PayloadCodec::default().encode(&job).unwrap();
        assert_eq!(PayloadCodec::default().decode(&raw).unwrap(), job);
        assert_eq!(
            serde_json::from_slice::<Value>(&raw).unwrap(),
            json!({"name": "ext-simple", "id": true})
        );
    }

    #[test]
    fn test_compound_id_is_rejected() {
        let err = decode(json!({"name": "ext-simple", "id": [1]})).unwrap_err();
        assert_eq!(
            err,
            PayloadError::MissingField {
                field: PayloadField::Id,
                problem: FieldProblem::WrongType { expected: "scalar" },
            }
        );
    }

    #[test]
    fn test_null_meta_counts_as_absent() {
        let job = decode(json!({"name": "ext-simple", "id": "x", "meta": null})).unwrap();
        assert_eq!(job.meta(), None);
    }

    #[test]
    fn test_decoded_fields_match_input() {
        let input = json!({
            "name": "mail",
            "id": "a-7",
            "meta": "tenant=4",
            "to": "ops@example.com",
            "attempts": [1, 2]
        });

        let job = decode(input.clone()).unwrap();
        assert_eq!(job.name(), "mail");
        assert_eq!(job.id(), &JobId::from("a-7"));
        assert_eq!(job.meta(), Some("tenant=4"));
        assert_eq!(job.field("attempts"), Some(&json!([1, 2])));
        assert_eq!(serde_json::to_value(&job).unwrap(), input);
    }

    #[test]
    fn test_encode_then_decode_msgpack() {
        let codec = PayloadCodec::new(Serializer::MessagePack);
        let job = JobDescriptor::new("resize", 9).with_field("width", 640);

        let raw = codec.encode(&job).unwrap();
        assert_eq!(codec.decode(&raw).unwrap(), job);
    }

    #[test]
    fn test_decode_message_wraps_job() {
        let raw = br#"{"name":"ext-simple","id":1}"#;
        let message = PayloadCodec::default().decode_message(raw).unwrap();
        assert_eq!(message.name(), "ext-simple");
    }
}
