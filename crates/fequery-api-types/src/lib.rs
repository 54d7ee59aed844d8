//! Wire types shared by the example resource API and its clients.

use serde::{Deserialize, Serialize};

/// Lower bound (inclusive) accepted for [`ExampleRecord::age`].
pub const AGE_MIN: u32 = 1;
/// Upper bound (inclusive) accepted for [`ExampleRecord::age`].
pub const AGE_MAX: u32 = 200;

/// A record of the `/example` collection.
///
/// `name` is the natural key: the remote collection enforces its uniqueness and
/// it never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExampleRecord {
    pub name: String,
    pub age: u32,
}

impl ExampleRecord {
    pub fn new(name: impl Into<String>, age: u32) -> Self {
        Self {
            name: name.into(),
            age,
        }
    }
}

/// Session information served by the auth `info` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: String,
    pub family_name: String,
    pub given_name: String,
    pub name: String,
    pub preferred_username: String,
    pub logout_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_uses_plain_field_names_on_the_wire() {
        let record = ExampleRecord::new("John", 30);
        let value = serde_json::to_value(&record).expect("serialize record");
        assert_eq!(value, serde_json::json!({ "name": "John", "age": 30 }));
    }

    #[test]
    fn user_info_decodes_from_snake_case_payload() {
        let info: UserInfo = serde_json::from_str(
            r#"{"email":"j@x.io","family_name":"Doe","given_name":"Jane","name":"Jane Doe","preferred_username":"jane","logout_url":"/logout"}"#,
        )
        .expect("decode user info");
        assert_eq!(info.preferred_username, "jane");
        assert_eq!(info.logout_url, "/logout");
    }
}
