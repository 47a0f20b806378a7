use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{raw, CommercialSupply, Program};
use crate::Result;

/// A listener whose station is the program they broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub program: Program,
}

impl User {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, program: Program) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            program,
        }
    }

    /// Build from the server's user dictionary; a missing program is empty
    pub fn from_value(raw: &Value, supply: &dyn CommercialSupply) -> Result<Self> {
        const CTX: &str = "user";
        raw::ensure_object(raw, CTX)?;

        let id = raw::required_str(raw, "id", CTX)?.to_string();
        let display_name = raw::optional_str(raw, "displayName", CTX)?
            .unwrap_or_default()
            .to_string();
        let program = match raw.get("program").filter(|v| !v.is_null()) {
            Some(p) => Program::from_value(p, supply)?,
            None => Program::default(),
        };

        Ok(Self {
            id,
            display_name,
            program,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoCommercials;
    use serde_json::json;

    #[test]
    fn test_user_without_program() {
        let user = User::from_value(&json!({ "id": "u1", "displayName": "Bob" }), &NoCommercials)
            .unwrap();
        assert_eq!(user.display_name, "Bob");
        assert!(user.program.playlist().is_empty());
        assert!(user.program.now_playing().is_none());
    }

    #[test]
    fn test_user_requires_id() {
        assert!(User::from_value(&json!({ "displayName": "Bob" }), &NoCommercials).is_err());
    }
}
