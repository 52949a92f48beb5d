use extract::CatalogProduct;
use extract::catalog::truncate_chars;
use serde::Serialize;
use serde_json::Value;

use crate::schema::FullPipelineInput;

const TEMPLATE: &str = include_str!("../prompts/full_pipeline.txt");

/// Tender text beyond this many characters is dropped before prompt construction.
pub const MAX_EDITAL_CHARS: usize = 80_000;

pub const TRUNCATION_MARKER: &str =
    "\n\n[...RESTANTE DO DOCUMENTO OMITIDO PARA RESPEITAR LIMITES DA API...]";

pub const FULL_PIPELINE_PDF_CHARS: usize = 3000;

const PDF_MISSING: &str = "PDF não disponível";

#[derive(Serialize)]
struct ProductView<'a> {
    product_id: &'a str,
    nome: &'a str,
    categoria: &'a str,
    descricao_curta: Option<&'a str>,
    aplicacao: Option<&'a str>,
    observacoes: Option<&'a str>,
    especificacoes_tecnicas: &'a Value,
    pdf_text: String,
}

impl<'a> ProductView<'a> {
    fn new(product: &'a CatalogProduct) -> Self {
        Self {
            product_id: &product.id,
            nome: &product.nome,
            categoria: &product.categoria,
            descricao_curta: product.descricao_curta.as_deref(),
            aplicacao: product.aplicacao.as_deref(),
            observacoes: product.observacoes.as_deref(),
            especificacoes_tecnicas: &product.especificacoes_tecnicas,
            pdf_text: product
                .pdf_excerpt(FULL_PIPELINE_PDF_CHARS)
                .unwrap_or_else(|| PDF_MISSING.to_string()),
        }
    }
}

/// Keep the first [`MAX_EDITAL_CHARS`] characters and append the omission marker.
/// Returns `None` when the text already fits.
pub fn truncate_edital_text(text: &str) -> Option<String> {
    if text.chars().count() <= MAX_EDITAL_CHARS {
        return None;
    }
    let mut cut = truncate_chars(text, MAX_EDITAL_CHARS).to_string();
    cut.push_str(TRUNCATION_MARKER);
    Some(cut)
}

/// `edital_text` is expected to be truncated already.
pub fn build_full_pipeline_prompt(
    input: &FullPipelineInput,
    edital_text: &str,
) -> Result<String, serde_json::Error> {
    let products: Vec<ProductView<'_>> = input.products.iter().map(ProductView::new).collect();
    let catalog_json = serde_json::to_string_pretty(&products)?;

    Ok(render(TEMPLATE, |key| match key {
        "EDITAL_NAME" => Some(input.edital_name.as_str()),
        "EDITAL_TEXT" => Some(edital_text),
        "CATALOG_JSON" => Some(catalog_json.as_str()),
        _ => None,
    }))
}

/// Substitute `{{KEY}}` placeholders in one pass. Substituted values are never scanned
/// again, so document text containing braces is copied as-is. Unknown keys are kept.
fn render<'v>(template: &str, lookup: impl Fn(&str) -> Option<&'v str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let key = &rest[start + 2..start + 2 + len];
        out.push_str(&rest[..start]);
        match lookup(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + len + 4]),
        }
        rest = &rest[start + len + 4..];
    }
    out.push_str(rest);
    out
}
