use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A catalog product as the pipelines see it. Read-only input; the field names follow
/// the catalog's own columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: String,
    pub nome: String,
    pub categoria: String,
    #[serde(default)]
    pub descricao_curta: Option<String>,
    #[serde(default)]
    pub aplicacao: Option<String>,
    #[serde(default)]
    pub observacoes: Option<String>,
    #[serde(default = "empty_object")]
    pub especificacoes_tecnicas: Value,
    #[serde(default)]
    pub pdf_text: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl CatalogProduct {
    /// PDF text cut to at most `max_chars` characters, for embedding in a prompt.
    pub fn pdf_excerpt(&self, max_chars: usize) -> Option<String> {
        self.pdf_text
            .as_deref()
            .map(|text| truncate_chars(text, max_chars).to_string())
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ventilação", 8), "ventilaç");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn missing_optional_columns_default() {
        let product: CatalogProduct = serde_json::from_str(
            r#"{"id":"p1","nome":"SAT 700","categoria":"Anestesia"}"#,
        )
        .unwrap();
        assert!(product.descricao_curta.is_none());
        assert!(product.especificacoes_tecnicas.is_object());
        assert_eq!(product.pdf_excerpt(10), None);
    }
}
