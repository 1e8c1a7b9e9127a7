use std::collections::HashSet;

use async_graphql::{InputObject, SimpleObject};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::err::{Error, Result};
use crate::scalar::Date;
use crate::store::{Collection, Document, FieldPath};

pub const STUDENTS: Collection = Collection::new("students");

lazy_static! {
    /// Every scalar field a student document may carry, nested ones in dotted
    /// form. Object-valued fields are left out: their text form differs
    /// between stores.
    static ref STUDENT_FIELDS: HashSet<&'static str> = [
        "sid",
        "name.first",
        "name.last",
        "dob",
        "picture.large",
        "location.street",
        "location.city",
        "location.state",
        "location.postcode",
        "phone",
        "cell",
        "email",
        "major",
        "gpa",
        "registered",
        "modified",
        "modifiedby",
    ]
    .into_iter()
    .collect();
}

/// Resolves a client supplied field name against the known student fields.
pub fn student_field(name: &str) -> Result<FieldPath> {
    if STUDENT_FIELDS.contains(name) {
        Ok(FieldPath::parse(name))
    } else {
        Err(Error::invalid(format!("`{}` is not a student field", name)))
    }
}

/// A student document as stored. Only `sid` is guaranteed to be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub sid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<Picture>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpa: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiedby: Option<String>,
}

impl TryFrom<Document> for StudentRecord {
    type Error = Error;

    fn try_from(doc: Document) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
pub struct Name {
    pub first: Option<String>,
    pub last: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
pub struct Picture {
    pub large: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
pub struct Location {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
}

/// Fields a client may write. `sid` only selects the document and never
/// ends up in the serialized patch.
#[derive(Debug, Clone, Default, Serialize, InputObject)]
pub struct StudentInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<NameInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<Date>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<PictureInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpa: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered: Option<Date>,
    #[serde(skip)]
    pub sid: Option<async_graphql::ID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<Date>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifiedby: Option<String>,
}

impl StudentInput {
    /// The fields present in the input, ready to be stored or merged.
    pub fn into_document(self) -> Result<Document> {
        match serde_json::to_value(&self)? {
            Value::Object(doc) => Ok(doc),
            other => Err(Error::internal(
                "SerializationError",
                format!("student input serialized to {}", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, InputObject)]
pub struct NameInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, InputObject)]
pub struct PictureInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, InputObject)]
pub struct LocationInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
}

#[derive(Debug, Clone, Default, InputObject)]
pub struct DeleteInput {
    pub sid: Option<async_graphql::ID>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_fields_only() {
        assert_eq!(
            student_field("location.city").unwrap(),
            FieldPath::parse("location.city")
        );
        assert!(student_field("$where").is_err());
        assert!(student_field("name.middle").is_err());
        for object in ["name", "picture", "location"] {
            assert!(student_field(object).is_err(), "{} holds an object", object);
        }
    }

    #[test]
    fn input_document_omits_absent_fields_and_sid() {
        let input = StudentInput {
            name: Some(NameInput {
                first: Some("Ann".into()),
                last: None,
            }),
            major: Some("CS".into()),
            sid: Some("client-chosen".into()),
            ..Default::default()
        };
        let doc = input.into_document().unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({ "name": { "first": "Ann" }, "major": "CS" })
        );
    }

    #[test]
    fn partial_documents_decode() {
        let doc = match json!({ "sid": "s-1", "gpa": "3.4", "dob": 0, "extra": true }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let record = StudentRecord::try_from(doc).unwrap();
        assert_eq!(record.gpa.as_deref(), Some("3.4"));
        assert_eq!(record.dob.and_then(|d| d.millis()), Some(0));
        assert!(record.name.is_none());
    }

    #[test]
    fn documents_without_sid_are_rejected() {
        let err = StudentRecord::try_from(Document::new()).unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
