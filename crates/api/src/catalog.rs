use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use extract::CatalogProduct;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Supplier of the company's product catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Active products, restricted to `ids` when the caller names any.
    async fn active_products(&self, ids: Option<&[String]>) -> Result<Vec<CatalogProduct>>;
}

/// A catalog row as stored: activation flag, raw spec object and PDF link.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub nome: String,
    pub categoria: String,
    #[serde(default)]
    pub descricao_curta: Option<String>,
    #[serde(default)]
    pub aplicacao: Option<String>,
    #[serde(default)]
    pub observacoes: Option<String>,
    #[serde(default)]
    pub especificacoes: Option<Value>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default = "default_active")]
    pub ativo: bool,
}

fn default_active() -> bool {
    true
}

impl CatalogRecord {
    fn into_product(self) -> CatalogProduct {
        CatalogProduct {
            id: self.id,
            nome: self.nome,
            categoria: self.categoria,
            descricao_curta: self.descricao_curta,
            aplicacao: self.aplicacao,
            observacoes: self.observacoes,
            especificacoes_tecnicas: self
                .especificacoes
                .filter(Value::is_object)
                .unwrap_or_else(|| Value::Object(Map::new())),
            pdf_text: self
                .pdf_url
                .map(|url| format!("Produto com catálogo PDF disponível em: {url}")),
        }
    }
}

/// Catalog held in memory, loaded once from a JSON array of records.
#[derive(Debug, Default)]
pub struct JsonCatalog {
    records: Vec<CatalogRecord>,
}

impl JsonCatalog {
    pub fn new(records: Vec<CatalogRecord>) -> Self {
        Self { records }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        let records: Vec<CatalogRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid catalog file {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            products = records.len(),
            active = records.iter().filter(|r| r.ativo).count(),
            "Catalog loaded"
        );
        Ok(Self::new(records))
    }
}

#[async_trait]
impl CatalogSource for JsonCatalog {
    async fn active_products(&self, ids: Option<&[String]>) -> Result<Vec<CatalogProduct>> {
        let wanted = ids.filter(|ids| !ids.is_empty());
        Ok(self
            .records
            .iter()
            .filter(|r| r.ativo)
            .filter(|r| wanted.is_none_or(|ids| ids.contains(&r.id)))
            .cloned()
            .map(CatalogRecord::into_product)
            .collect())
    }
}
