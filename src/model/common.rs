use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Primary key of every table. Experiment ids double as the public
/// experiment code handed out to subjects.
pub type Id = i64;

/// Random opaque token, used for session keys and password salts.
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

/// An id that the browser may send either as a JSON number or as a string
/// (form fields are always strings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseId {
    Number(i64),
    Text(String),
}

impl LooseId {
    /// Returns the id when it is a positive integer.
    pub fn parse(&self) -> Option<Id> {
        let id = match self {
            LooseId::Number(n) => *n,
            LooseId::Text(s) => s.trim().parse::<i64>().ok()?,
        };
        (id > 0).then_some(id)
    }
}

/// A scalar field the browser may send as a JSON string or a bare number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

impl TextOrNumber {
    pub fn into_string(self) -> String {
        match self {
            TextOrNumber::Text(s) => s,
            TextOrNumber::Number(n) => n.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_id_accepts_numbers_and_numeric_strings() {
        let from_number: LooseId = serde_json::from_str("42").unwrap();
        let from_text: LooseId = serde_json::from_str("\" 42 \"").unwrap();

        assert_eq!(from_number.parse(), Some(42));
        assert_eq!(from_text.parse(), Some(42));
    }

    #[test]
    fn test_loose_id_rejects_garbage_and_non_positive() {
        assert_eq!(LooseId::Text("abc".to_string()).parse(), None);
        assert_eq!(LooseId::Number(0).parse(), None);
        assert_eq!(LooseId::Number(-3).parse(), None);
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(generate_token(), generate_token());
        assert_eq!(generate_token().len(), 32);
    }
}
